use crate::codes;
use crate::dsn::DsnStatus;
use crate::reply;
use crate::session::SmtpSession;
use async_trait::async_trait;
use tern_proto::{CommandHandler, ProtocolSession, Response};

/// STARTTLS: flag the transport for upgrade; it flushes the 220 go-ahead,
/// discards any pipelined bytes and swaps in the TLS stream. Only registered
/// when the pipeline actually has an upgrader.
pub struct StartTlsCmdHandler;

#[async_trait]
impl CommandHandler<SmtpSession> for StartTlsCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["STARTTLS"]
    }

    async fn on_command(
        &self,
        session: &mut SmtpSession,
        _verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if args.is_some_and(|a| !a.trim().is_empty()) {
            return Ok(reply::single(
                codes::SYNTAX_ERROR_ARGUMENTS,
                Some(DsnStatus::permanent(5, 4)),
                "No parameters allowed with STARTTLS",
            ));
        }
        if session.is_tls() {
            return Ok(reply::single(
                codes::BAD_SEQUENCE,
                Some(DsnStatus::permanent(5, 1)),
                "TLS already active",
            ));
        }
        session.transport_mut().request_tls_upgrade();
        Ok(reply::single(
            codes::SERVICE_READY,
            None,
            "Ready to start TLS",
        ))
    }
}
