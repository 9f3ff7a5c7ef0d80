use crate::codes;
use crate::dsn::DsnStatus;
use crate::hook::{HookResult, QuitHook};
use crate::hookable::HookableCmdHandler;
use crate::reply;
use crate::session::SmtpSession;
use async_trait::async_trait;
use std::sync::Arc;
use tern_proto::{CommandHandler, Response};

/// RSET: drop the transaction, keep the HELO mode.
pub struct RsetCmdHandler;

#[async_trait]
impl CommandHandler<SmtpSession> for RsetCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["RSET"]
    }

    async fn on_command(
        &self,
        session: &mut SmtpSession,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        session.reset_state();
        Ok(reply::single(
            codes::MAIL_OK,
            Some(DsnStatus::success(0, 0)),
            "OK",
        ))
    }
}

pub struct NoopCmdHandler;

#[async_trait]
impl CommandHandler<SmtpSession> for NoopCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["NOOP"]
    }

    async fn on_command(
        &self,
        _session: &mut SmtpSession,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        Ok(reply::single(
            codes::MAIL_OK,
            Some(DsnStatus::success(0, 0)),
            "OK",
        ))
    }
}

/// VRFY: deliberately noncommittal, per the usual anti-harvesting stance.
pub struct VrfyCmdHandler;

#[async_trait]
impl CommandHandler<SmtpSession> for VrfyCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["VRFY"]
    }

    async fn on_command(
        &self,
        _session: &mut SmtpSession,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        Ok(reply::single(
            codes::CANNOT_VRFY,
            None,
            "Cannot VRFY user; try RCPT to attempt delivery",
        ))
    }
}

/// QUIT: consult the QuitHooks, then close with 221.
pub struct QuitCmdHandler {
    hooks: Vec<Arc<dyn QuitHook>>,
}

impl QuitCmdHandler {
    pub fn new() -> Self {
        Self { hooks: vec![] }
    }
}

impl Default for QuitCmdHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HookableCmdHandler for QuitCmdHandler {
    type Hook = dyn QuitHook;

    fn implemented_verbs(&self) -> &[&'static str] {
        &["QUIT"]
    }

    fn hooks(&self) -> &[Arc<dyn QuitHook>] {
        &self.hooks
    }

    fn set_hooks(&mut self, hooks: Vec<Arc<dyn QuitHook>>) {
        self.hooks = hooks;
    }

    async fn do_filter_checks(
        &self,
        _session: &mut SmtpSession,
        _verb: &str,
        _args: Option<&str>,
    ) -> Option<Response> {
        None
    }

    async fn call_hook(
        &self,
        hook: &dyn QuitHook,
        session: &mut SmtpSession,
        _args: Option<&str>,
    ) -> HookResult {
        hook.do_quit(session).await
    }

    async fn do_core_cmd(
        &self,
        session: &mut SmtpSession,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        Ok(reply::single(
            codes::SERVICE_CLOSING,
            Some(DsnStatus::success(0, 0)),
            format!(
                "{} Service closing transmission channel",
                session.hello_name()
            ),
        )
        .end_session())
    }
}

/// Fallback for verbs nothing else implements.
pub struct UnknownCmdHandler;

#[async_trait]
impl CommandHandler<SmtpSession> for UnknownCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &[tern_proto::chain::UNKNOWN_VERB]
    }

    async fn on_command(
        &self,
        _session: &mut SmtpSession,
        verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        Ok(reply::single(
            codes::UNRECOGNIZED_COMMAND,
            Some(DsnStatus::permanent(5, 1)),
            format!("Unrecognized command {verb}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ReversePath;
    use crate::session::test_support::session;
    use crate::session::HeloMode;

    #[tokio::test]
    async fn rset_preserves_the_helo_mode() {
        let handler = RsetCmdHandler;
        let mut sess = session();
        sess.set_helo_mode(HeloMode::Ehlo);
        sess.set_pending_sender(ReversePath::NullSender);
        sess.commit_sender();

        let response = handler.on_command(&mut sess, "RSET", None).await.unwrap();
        assert_eq!(response.lines(), &["250 2.0.0 OK".to_string()]);
        assert_eq!(sess.helo_mode(), Some(HeloMode::Ehlo));
        assert!(sess.sender().is_none());
    }

    #[tokio::test]
    async fn quit_closes_the_session() {
        let handler = QuitCmdHandler::new();
        let mut sess = session();
        let response = handler.on_command(&mut sess, "QUIT", None).await.unwrap();
        assert_eq!(response.ret_code(), "221");
        assert!(response.is_end_session());
    }

    #[tokio::test]
    async fn unknown_names_the_offending_verb() {
        let handler = UnknownCmdHandler;
        let mut sess = session();
        let response = handler
            .on_command(&mut sess, "FROB", Some("x"))
            .await
            .unwrap();
        assert_eq!(
            response.lines(),
            &["500 5.5.1 Unrecognized command FROB".to_string()]
        );
    }
}
