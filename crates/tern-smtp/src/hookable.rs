//! The hookable command template.
//!
//! Most SMTP verbs follow the same shape: run filter checks against session
//! state, walk the verb's hook chain, and either synthesize a reply from the
//! hook that took ownership or fall through to the core command. Implement
//! [`HookableCmdHandler`] and the blanket impl turns it into a
//! [`CommandHandler`] with that algorithm, including the wiring pass that
//! pulls the hook providers out of the registry.

use crate::codes;
use crate::dsn::DsnStatus;
use crate::hook::{HookResult, HookReturnCode};
use crate::reply;
use crate::session::SmtpSession;
use async_trait::async_trait;
use std::sync::Arc;
use tern_proto::{CommandHandler, HookRegistry, Response, WiringError};

#[async_trait]
pub trait HookableCmdHandler: Send + Sync {
    /// The single hook capability this command consults.
    type Hook: ?Sized + Send + Sync + 'static;

    fn implemented_verbs(&self) -> &[&'static str];

    fn hooks(&self) -> &[Arc<Self::Hook>];

    fn set_hooks(&mut self, hooks: Vec<Arc<Self::Hook>>);

    /// Syntax and sequence checks; `Some` short-circuits the command.
    async fn do_filter_checks(
        &self,
        session: &mut SmtpSession,
        verb: &str,
        args: Option<&str>,
    ) -> Option<Response>;

    async fn call_hook(
        &self,
        hook: &Self::Hook,
        session: &mut SmtpSession,
        args: Option<&str>,
    ) -> HookResult;

    /// The command proper; runs only when no hook took ownership.
    async fn do_core_cmd(
        &self,
        session: &mut SmtpSession,
        verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response>;

    /// Runs when a hook accepted the command with OK and supplied the
    /// reply itself: the command's state transition must still happen.
    async fn on_hook_accepted(&self, _session: &mut SmtpSession) {}
}

/// Walk a hook chain's results: DECLINED continues, OK is recorded and
/// continues (a later DECLINED cannot override it), DENY/DENYSOFT/DISCONNECT
/// stop the chain.
pub fn merge_hook_results(
    recorded: &mut Option<HookResult>,
    result: HookResult,
) -> bool {
    match result.code {
        HookReturnCode::Declined => true,
        HookReturnCode::Ok => {
            *recorded = Some(result);
            true
        }
        HookReturnCode::Deny | HookReturnCode::DenySoft | HookReturnCode::Disconnect => {
            *recorded = Some(result);
            false
        }
    }
}

/// Render the reply for a terminal hook result, falling back to the
/// protocol defaults when the hook did not supply one.
pub fn synthesize_response(result: &HookResult) -> Response {
    let (default_code, default_dsn, default_message, end_session) = match result.code {
        HookReturnCode::Ok => (
            codes::MAIL_OK,
            DsnStatus::success(0, 0),
            "OK",
            false,
        ),
        HookReturnCode::Deny => (
            codes::TRANSACTION_FAILED,
            DsnStatus::permanent(7, 1),
            "Rejected by policy",
            false,
        ),
        HookReturnCode::DenySoft => (
            codes::LOCAL_ERROR,
            DsnStatus::temporary(3, 0),
            "Temporary problem, please try again later",
            false,
        ),
        HookReturnCode::Disconnect => (
            codes::SERVICE_NOT_AVAILABLE,
            DsnStatus::temporary(3, 0),
            "Closing connection",
            true,
        ),
        HookReturnCode::Declined => unreachable!("DECLINED never synthesizes a reply"),
    };

    let response = reply::single(
        result.smtp_code.unwrap_or(default_code),
        Some(result.dsn.unwrap_or(default_dsn)),
        result.message.as_deref().unwrap_or(default_message),
    );
    if end_session {
        response.end_session()
    } else {
        response
    }
}

#[async_trait]
impl<T: HookableCmdHandler> CommandHandler<SmtpSession> for T {
    fn verbs(&self) -> &[&'static str] {
        self.implemented_verbs()
    }

    fn wire(&mut self, hooks: &HookRegistry) -> Result<(), WiringError> {
        self.set_hooks(hooks.get::<T::Hook>());
        Ok(())
    }

    async fn on_command(
        &self,
        session: &mut SmtpSession,
        verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = self.do_filter_checks(session, verb, args).await {
            return Ok(response);
        }

        let mut recorded = None;
        for hook in self.hooks() {
            let result = self.call_hook(hook, session, args).await;
            if !merge_hook_results(&mut recorded, result) {
                break;
            }
        }

        match recorded {
            Some(result) => {
                if result.code == HookReturnCode::Ok {
                    self.on_hook_accepted(session).await;
                }
                Ok(synthesize_response(&result))
            }
            None => self.do_core_cmd(session, verb, args).await,
        }
    }
}
