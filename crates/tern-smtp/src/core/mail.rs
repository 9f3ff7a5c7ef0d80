use crate::codes;
use crate::dsn::DsnStatus;
use crate::hook::{HookResult, MailHook};
use crate::hookable::HookableCmdHandler;
use crate::parser::{self, ReversePath};
use crate::reply;
use crate::session::SmtpSession;
use async_trait::async_trait;
use std::sync::Arc;
use tern_proto::Response;

/// MAIL FROM: opens a transaction once the argument parses and policy
/// checks pass. The sender is committed to the transaction only after the
/// hook chain accepts it, so a denied MAIL leaves the session where it was.
pub struct MailCmdHandler {
    hooks: Vec<Arc<dyn MailHook>>,
}

impl MailCmdHandler {
    pub fn new() -> Self {
        Self { hooks: vec![] }
    }
}

impl Default for MailCmdHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HookableCmdHandler for MailCmdHandler {
    type Hook = dyn MailHook;

    fn implemented_verbs(&self) -> &[&'static str] {
        &["MAIL"]
    }

    fn hooks(&self) -> &[Arc<dyn MailHook>] {
        &self.hooks
    }

    fn set_hooks(&mut self, hooks: Vec<Arc<dyn MailHook>>) {
        self.hooks = hooks;
    }

    async fn do_filter_checks(
        &self,
        session: &mut SmtpSession,
        verb: &str,
        args: Option<&str>,
    ) -> Option<Response> {
        if session.use_helo_ehlo_enforcement() && session.helo_mode().is_none() {
            return Some(reply::single(
                codes::BAD_SEQUENCE,
                Some(DsnStatus::permanent(5, 1)),
                format!("Need HELO or EHLO before {verb}"),
            ));
        }
        if session.sender().is_some() {
            return Some(reply::single(
                codes::BAD_SEQUENCE,
                Some(DsnStatus::permanent(5, 1)),
                "Sender already specified",
            ));
        }
        let Some(args) = args else {
            return Some(reply::single(
                codes::SYNTAX_ERROR_ARGUMENTS,
                Some(DsnStatus::permanent(5, 2)),
                "Usage: MAIL FROM:<sender>",
            ));
        };

        let parsed = match parser::parse_mail_args(args) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!("unparseable MAIL arguments {args:?}: {err}");
                return Some(reply::single(
                    codes::SYNTAX_ERROR_ARGUMENTS,
                    Some(DsnStatus::permanent(1, 7)),
                    "Syntax error in sender address",
                ));
            }
        };
        if session.use_address_brackets() && !parsed.angle_brackets {
            return Some(reply::single(
                codes::SYNTAX_ERROR_ARGUMENTS,
                Some(DsnStatus::permanent(5, 2)),
                "Sender address must be enclosed in angle brackets",
            ));
        }

        for param in &parsed.parameters {
            if param.name.eq_ignore_ascii_case("SIZE") {
                let declared = param
                    .value
                    .as_deref()
                    .and_then(|v| v.parse::<u64>().ok());
                let Some(declared) = declared else {
                    return Some(reply::single(
                        codes::SYNTAX_ERROR_ARGUMENTS,
                        Some(DsnStatus::permanent(5, 4)),
                        "Invalid SIZE parameter",
                    ));
                };
                let max = session.max_message_size();
                if max > 0 && declared > max {
                    return Some(reply::single(
                        codes::QUOTA_EXCEEDED,
                        Some(DsnStatus::permanent(3, 4)),
                        "Message size exceeds fixed maximum message size",
                    ));
                }
                session.set_size_hint(declared);
            }
            // other parameters (BODY=8BITMIME etc.) are accepted silently
        }

        session.set_pending_sender(parsed.address);
        None
    }

    async fn call_hook(
        &self,
        hook: &dyn MailHook,
        session: &mut SmtpSession,
        _args: Option<&str>,
    ) -> HookResult {
        let sender = session
            .pending_sender()
            .cloned()
            .unwrap_or(ReversePath::NullSender);
        hook.do_mail(session, &sender).await
    }

    async fn do_core_cmd(
        &self,
        session: &mut SmtpSession,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        let sender = session
            .commit_sender()
            .unwrap_or(ReversePath::NullSender);
        Ok(reply::single(
            codes::MAIL_OK,
            Some(DsnStatus::success(1, 0)),
            format!("Sender <{sender}> OK"),
        ))
    }

    async fn on_hook_accepted(&self, session: &mut SmtpSession) {
        session.commit_sender();
    }
}
