use cidr::AnyIpCidr;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;

/// Set of CIDR blocks used for remote-IP keyed policy decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CidrSet(Vec<AnyIpCidr>);

impl CidrSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loopback peers, the usual default for relay permission.
    pub fn default_trusted_hosts() -> Self {
        vec!["127.0.0.0/8", "::1"].try_into().unwrap()
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.iter().any(|cidr| cidr.contains(&ip))
    }

    pub fn insert(&mut self, cidr: AnyIpCidr) {
        self.0.push(cidr);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<String>> for CidrSet {
    type Error = cidr::errors::NetworkParseError;

    fn try_from(entries: Vec<String>) -> Result<Self, Self::Error> {
        let mut set = Self::new();
        for entry in entries {
            set.insert(AnyIpCidr::from_str(&entry)?);
        }
        Ok(set)
    }
}

impl TryFrom<Vec<&str>> for CidrSet {
    type Error = cidr::errors::NetworkParseError;

    fn try_from(entries: Vec<&str>) -> Result<Self, Self::Error> {
        entries
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
            .try_into()
    }
}

impl From<CidrSet> for Vec<String> {
    fn from(set: CidrSet) -> Self {
        set.0.iter().map(|cidr| cidr.to_string()).collect()
    }
}

/// Server policy knobs consumed by the SMTP session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Name the server announces in its greeting and HELO replies.
    #[serde(default = "SmtpConfig::default_hello_name")]
    pub hello_name: String,

    /// Greeting text; defaults to `"<hello_name> ESMTP service ready"`.
    #[serde(default)]
    pub greeting: Option<String>,

    /// Upper bound on message size in bytes. 0 disables the limit.
    #[serde(default)]
    pub max_message_size: u64,

    /// Peers allowed to relay without authenticating.
    #[serde(default = "CidrSet::default_trusted_hosts")]
    pub relay_hosts: CidrSet,

    /// Peers that must authenticate before relaying.
    #[serde(default)]
    pub auth_required_hosts: CidrSet,

    /// Require sender/recipient addresses to be enclosed in `<>`.
    #[serde(default = "SmtpConfig::default_true")]
    pub enforce_address_brackets: bool,

    /// Reject MAIL before HELO/EHLO.
    #[serde(default = "SmtpConfig::default_true")]
    pub enforce_helo_ehlo: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            hello_name: Self::default_hello_name(),
            greeting: None,
            max_message_size: 0,
            relay_hosts: CidrSet::default_trusted_hosts(),
            auth_required_hosts: CidrSet::new(),
            enforce_address_brackets: true,
            enforce_helo_ehlo: true,
        }
    }
}

impl SmtpConfig {
    fn default_hello_name() -> String {
        "localhost".to_string()
    }

    fn default_true() -> bool {
        true
    }

    pub fn greeting(&self) -> String {
        self.greeting
            .clone()
            .unwrap_or_else(|| format!("{} ESMTP service ready", self.hello_name))
    }

    pub fn relaying_allowed(&self, ip: IpAddr) -> bool {
        self.relay_hosts.contains(ip)
    }

    pub fn auth_required(&self, ip: IpAddr) -> bool {
        self.auth_required_hosts.contains(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_set_matching() {
        let set: CidrSet = vec!["10.0.0.0/8", "192.168.1.1"].try_into().unwrap();
        assert!(set.contains("10.1.2.3".parse().unwrap()));
        assert!(set.contains("192.168.1.1".parse().unwrap()));
        assert!(!set.contains("192.168.1.2".parse().unwrap()));
        assert!(!set.contains("::1".parse().unwrap()));
    }

    #[test]
    fn trusted_hosts_default_covers_loopback() {
        let config = SmtpConfig::default();
        assert!(config.relaying_allowed("127.0.0.1".parse().unwrap()));
        assert!(config.relaying_allowed("::1".parse().unwrap()));
        assert!(!config.relaying_allowed("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn greeting_falls_back_to_hello_name() {
        let config = SmtpConfig {
            hello_name: "mx.example".to_string(),
            ..SmtpConfig::default()
        };
        assert_eq!(config.greeting(), "mx.example ESMTP service ready");

        let config = SmtpConfig {
            greeting: Some("custom banner".to_string()),
            ..SmtpConfig::default()
        };
        assert_eq!(config.greeting(), "custom banner");
    }
}
