use crate::codes;
use crate::dsn::DsnStatus;
use crate::hook::{HookResult, HookReturnCode, RcptHook};
use crate::hookable::HookableCmdHandler;
use crate::parser::{self, ForwardPath};
use crate::reply;
use crate::session::SmtpSession;
use async_trait::async_trait;
use std::sync::Arc;
use tern_proto::Response;

/// RCPT TO: appends to the recipient list. As with MAIL, the recipient is
/// committed only after the hook chain accepts it.
pub struct RcptCmdHandler {
    hooks: Vec<Arc<dyn RcptHook>>,
}

impl RcptCmdHandler {
    pub fn new() -> Self {
        Self { hooks: vec![] }
    }
}

impl Default for RcptCmdHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HookableCmdHandler for RcptCmdHandler {
    type Hook = dyn RcptHook;

    fn implemented_verbs(&self) -> &[&'static str] {
        &["RCPT"]
    }

    fn hooks(&self) -> &[Arc<dyn RcptHook>] {
        &self.hooks
    }

    fn set_hooks(&mut self, hooks: Vec<Arc<dyn RcptHook>>) {
        self.hooks = hooks;
    }

    async fn do_filter_checks(
        &self,
        session: &mut SmtpSession,
        _verb: &str,
        args: Option<&str>,
    ) -> Option<Response> {
        if session.sender().is_none() {
            return Some(reply::single(
                codes::BAD_SEQUENCE,
                Some(DsnStatus::permanent(5, 1)),
                "Need MAIL before RCPT",
            ));
        }
        let Some(args) = args else {
            return Some(reply::single(
                codes::SYNTAX_ERROR_ARGUMENTS,
                Some(DsnStatus::permanent(5, 2)),
                "Usage: RCPT TO:<recipient>",
            ));
        };

        let parsed = match parser::parse_rcpt_args(args) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!("unparseable RCPT arguments {args:?}: {err}");
                return Some(reply::single(
                    codes::SYNTAX_ERROR_ARGUMENTS,
                    Some(DsnStatus::permanent(1, 3)),
                    "Syntax error in recipient address",
                ));
            }
        };
        if session.use_address_brackets() && !parsed.angle_brackets {
            return Some(reply::single(
                codes::SYNTAX_ERROR_ARGUMENTS,
                Some(DsnStatus::permanent(5, 2)),
                "Recipient address must be enclosed in angle brackets",
            ));
        }

        session.set_pending_rcpt(parsed.address);
        None
    }

    async fn call_hook(
        &self,
        hook: &dyn RcptHook,
        session: &mut SmtpSession,
        _args: Option<&str>,
    ) -> HookResult {
        let recipient = session
            .pending_rcpt()
            .cloned()
            .unwrap_or(ForwardPath::Postmaster);
        hook.do_rcpt(session, &recipient).await
    }

    async fn do_core_cmd(
        &self,
        session: &mut SmtpSession,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        let recipient = session
            .commit_rcpt()
            .unwrap_or(ForwardPath::Postmaster);
        Ok(reply::single(
            codes::MAIL_OK,
            Some(DsnStatus::success(1, 5)),
            format!("Recipient <{recipient}> OK"),
        ))
    }

    async fn on_hook_accepted(&self, session: &mut SmtpSession) {
        session.commit_rcpt();
    }
}

/// Denies relaying for peers that are neither trusted nor authenticated.
///
/// When the chain was assembled with an auth backend the denial invites the
/// client to authenticate (530); otherwise relaying is refused outright.
pub struct AuthRequiredToRelayRcptHook {
    auth_offered: bool,
}

impl AuthRequiredToRelayRcptHook {
    pub fn new(auth_offered: bool) -> Self {
        Self { auth_offered }
    }
}

#[async_trait]
impl RcptHook for AuthRequiredToRelayRcptHook {
    async fn do_rcpt(
        &self,
        session: &mut SmtpSession,
        _recipient: &ForwardPath,
    ) -> HookResult {
        if session.is_relaying_allowed() {
            return HookResult::declined();
        }
        if self.auth_offered && session.is_auth_required() {
            HookResult::with_response(
                HookReturnCode::Deny,
                codes::AUTH_REQUIRED,
                DsnStatus::permanent(7, 1),
                "Authentication required",
            )
        } else {
            HookResult::with_response(
                HookReturnCode::Deny,
                codes::MAILBOX_UNAVAILABLE,
                DsnStatus::permanent(7, 1),
                "Relaying denied",
            )
        }
    }
}
