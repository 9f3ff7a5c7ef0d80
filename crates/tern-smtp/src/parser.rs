//! Parser for SMTP command arguments.
//!
//! The command dispatcher hands each handler the raw argument remainder of
//! its line; the functions here turn the MAIL and RCPT remainders into
//! typed paths and ESMTP parameters.

use pest::iterators::{Pair, Pairs};
use pest::Parser as _;
use pest_derive::Parser;
use std::fmt;

#[derive(Parser)]
#[grammar = "smtp.pest"]
struct ArgParser;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReversePath {
    Path(MailPath),
    NullSender,
}

impl ReversePath {
    /// The sender domain when it is a DNS name (address literals and the
    /// null sender have none).
    pub fn domain_name(&self) -> Option<&str> {
        match self {
            Self::Path(path) => match &path.mailbox.domain {
                Domain::Name(name) => Some(name),
                _ => None,
            },
            Self::NullSender => None,
        }
    }
}

impl fmt::Display for ReversePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => path.fmt(f),
            Self::NullSender => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardPath {
    Path(MailPath),
    Postmaster,
}

impl fmt::Display for ForwardPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => path.fmt(f),
            Self::Postmaster => write!(f, "postmaster"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailPath {
    pub at_domain_list: Vec<String>,
    pub mailbox: Mailbox,
}

impl fmt::Display for MailPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // RFC 5321: the source route form MUST BE accepted, SHOULD NOT be
        // generated, and SHOULD be ignored; it is not rendered back.
        self.mailbox.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub local_part: String,
    pub domain: Domain,
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Domain {
    Name(String),
    V4(String),
    V6(String),
    Tagged { tag: String, literal: String },
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::V4(addr) => write!(f, "[{addr}]"),
            Self::V6(addr) => write!(f, "[IPv6:{addr}]"),
            Self::Tagged { tag, literal } => write!(f, "[{tag}:{literal}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsmtpParameter {
    pub name: String,
    pub value: Option<String>,
}

impl fmt::Display for EsmtpParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.name, value),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct MailArgs {
    pub address: ReversePath,
    pub parameters: Vec<EsmtpParameter>,
    /// Whether the address was enclosed in angle brackets.
    pub angle_brackets: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RcptArgs {
    pub address: ForwardPath,
    pub parameters: Vec<EsmtpParameter>,
    /// Whether the address was enclosed in angle brackets.
    pub angle_brackets: bool,
}

/// Parse the argument remainder of `MAIL`, e.g. `FROM:<user@host> SIZE=100`.
pub fn parse_mail_args(text: &str) -> Result<MailArgs, String> {
    let pairs = ArgParser::parse(Rule::mail_args, text)
        .map_err(|err| format!("{err:#}"))?
        .next()
        .expect("grammar yields one mail_args node")
        .into_inner();

    let mut address = None;
    let mut no_angles = false;
    let mut parameters = vec![];
    for pair in pairs {
        match pair.as_rule() {
            Rule::reverse_path => {
                let inner = pair
                    .into_inner()
                    .next()
                    .expect("reverse_path has one alternative");
                address = Some(match inner.as_rule() {
                    Rule::null_sender => ReversePath::NullSender,
                    Rule::path => ReversePath::Path(parse_path(inner)?),
                    Rule::mailbox_no_angles => {
                        no_angles = true;
                        ReversePath::Path(parse_bare_mailbox(inner)?)
                    }
                    wat => return Err(format!("unexpected {wat:?}")),
                });
            }
            Rule::esmtp_param => parameters.push(parse_param(pair)),
            Rule::EOI => {}
            wat => return Err(format!("unexpected {wat:?}")),
        }
    }
    if no_angles && !parameters.is_empty() {
        return Err(
            "must enclose address in <> if you want to use ESMTP parameters".to_string(),
        );
    }
    Ok(MailArgs {
        address: address.ok_or("missing reverse path")?,
        parameters,
        angle_brackets: !no_angles,
    })
}

/// Parse the argument remainder of `RCPT`, e.g. `TO:<user@host>`.
pub fn parse_rcpt_args(text: &str) -> Result<RcptArgs, String> {
    let pairs = ArgParser::parse(Rule::rcpt_args, text)
        .map_err(|err| format!("{err:#}"))?
        .next()
        .expect("grammar yields one rcpt_args node")
        .into_inner();

    let mut address = None;
    let mut no_angles = false;
    let mut parameters = vec![];
    for pair in pairs {
        match pair.as_rule() {
            Rule::forward_path => {
                let inner = pair
                    .into_inner()
                    .next()
                    .expect("forward_path has one alternative");
                address = Some(match inner.as_rule() {
                    Rule::postmaster => ForwardPath::Postmaster,
                    Rule::path => ForwardPath::Path(parse_path(inner)?),
                    Rule::mailbox_no_angles => {
                        no_angles = true;
                        ForwardPath::Path(parse_bare_mailbox(inner)?)
                    }
                    wat => return Err(format!("unexpected {wat:?}")),
                });
            }
            Rule::esmtp_param => parameters.push(parse_param(pair)),
            Rule::EOI => {}
            wat => return Err(format!("unexpected {wat:?}")),
        }
    }
    if no_angles && !parameters.is_empty() {
        return Err(
            "must enclose address in <> if you want to use ESMTP parameters".to_string(),
        );
    }
    Ok(RcptArgs {
        address: address.ok_or("missing forward path")?,
        parameters,
        angle_brackets: !no_angles,
    })
}

pub fn is_valid_domain(text: &str) -> bool {
    ArgParser::parse(Rule::complete_domain, text).is_ok()
}

fn parse_path(path: Pair<Rule>) -> Result<MailPath, String> {
    let mut at_domain_list = vec![];
    for p in path.into_inner() {
        match p.as_rule() {
            Rule::adl => {
                for at_domain in p.into_inner() {
                    if let Some(domain) = at_domain.into_inner().next() {
                        at_domain_list.push(domain.as_str().to_string());
                    }
                }
            }
            Rule::mailbox => {
                let mailbox = parse_mailbox(p.into_inner())?;
                return Ok(MailPath {
                    at_domain_list,
                    mailbox,
                });
            }
            wat => return Err(format!("unexpected {wat:?}")),
        }
    }
    Err("path without mailbox".to_string())
}

fn parse_bare_mailbox(pair: Pair<Rule>) -> Result<MailPath, String> {
    let mailbox = pair
        .into_inner()
        .next()
        .expect("mailbox_no_angles wraps a mailbox");
    Ok(MailPath {
        at_domain_list: vec![],
        mailbox: parse_mailbox(mailbox.into_inner())?,
    })
}

fn parse_mailbox(mut pairs: Pairs<Rule>) -> Result<Mailbox, String> {
    let local_part = pairs
        .next()
        .ok_or("mailbox without local part")?
        .as_str()
        .to_string();
    let domain = parse_domain(pairs.next().ok_or("mailbox without domain")?)?;
    Ok(Mailbox { local_part, domain })
}

fn parse_domain(pair: Pair<Rule>) -> Result<Domain, String> {
    Ok(match pair.as_rule() {
        Rule::domain => Domain::Name(pair.as_str().to_string()),
        Rule::address_literal => {
            let literal = pair
                .into_inner()
                .next()
                .expect("address_literal has one alternative");
            match literal.as_rule() {
                Rule::ipv4_literal => Domain::V4(literal.as_str().to_string()),
                Rule::ipv6_literal => Domain::V6(
                    literal
                        .into_inner()
                        .next()
                        .expect("ipv6_literal wraps an address")
                        .as_str()
                        .to_string(),
                ),
                Rule::general_literal => {
                    let mut inner = literal.into_inner();
                    let tag = inner
                        .next()
                        .expect("general_literal starts with a tag")
                        .as_str()
                        .to_string();
                    let literal = inner
                        .next()
                        .expect("general_literal carries content")
                        .as_str()
                        .to_string();
                    Domain::Tagged { tag, literal }
                }
                wat => return Err(format!("unexpected {wat:?}")),
            }
        }
        wat => return Err(format!("unexpected {wat:?}")),
    })
}

fn parse_param(pair: Pair<Rule>) -> EsmtpParameter {
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .expect("esmtp_param starts with a keyword")
        .as_str()
        .to_string();
    let value = inner.next().map(|p| p.as_str().to_string());
    EsmtpParameter { name, value }
}
