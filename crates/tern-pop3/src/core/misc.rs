use crate::core::require_state;
use crate::reply;
use crate::session::{Pop3Session, Pop3State};
use async_trait::async_trait;
use tern_proto::{CommandHandler, ConnectHandler, ProtocolSession, Response};

/// Emits the `+OK` greeting when a client connects.
pub struct WelcomeMessageHandler;

#[async_trait]
impl ConnectHandler<Pop3Session> for WelcomeMessageHandler {
    async fn on_connect(&self, session: &mut Pop3Session) -> anyhow::Result<Option<Response>> {
        Ok(Some(reply::ok(session.greeting())))
    }
}

/// CAPA: static capability listing, valid in any state.
pub struct CapaCmdHandler {
    offer_stls: bool,
}

impl CapaCmdHandler {
    pub fn new(offer_stls: bool) -> Self {
        Self { offer_stls }
    }
}

#[async_trait]
impl CommandHandler<Pop3Session> for CapaCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["CAPA"]
    }

    async fn on_command(
        &self,
        _session: &mut Pop3Session,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        let mut capabilities = vec!["TOP", "USER", "UIDL", "PIPELINING"];
        if self.offer_stls {
            capabilities.push("STLS");
        }
        Ok(reply::ok_multiline("Capability list follows", capabilities))
    }
}

pub struct NoopCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for NoopCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["NOOP"]
    }

    async fn on_command(
        &self,
        _session: &mut Pop3Session,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        Ok(reply::ok(""))
    }
}

/// RSET: clear the deletion marks; POP3 carries nothing else across a
/// reset.
pub struct RsetCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for RsetCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["RSET"]
    }

    async fn on_command(
        &self,
        session: &mut Pop3Session,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = require_state(session, Pop3State::Transaction) {
            return Ok(response);
        }
        session.reset_state();
        if let Some(mailbox) = session.mailbox_mut() {
            mailbox.rollback();
        }
        let (count, size) = session.stat();
        Ok(reply::ok(format!("maildrop has {count} messages ({size} octets)")))
    }
}

/// QUIT: from Authorization, just close; from Transaction, enter Update and
/// apply the deletion marks first.
pub struct QuitCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for QuitCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["QUIT"]
    }

    async fn on_command(
        &self,
        session: &mut Pop3Session,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if session.state() != Pop3State::Transaction {
            return Ok(reply::ok("POP3 server signing off").end_session());
        }

        session.set_state(Pop3State::Update);
        if let Some(mailbox) = session.mailbox_mut() {
            if let Err(err) = mailbox.commit_deletes().await {
                tracing::error!("failed to expunge maildrop: {err:#}");
                return Ok(reply::err("some deleted messages not removed").end_session());
            }
        }
        Ok(reply::ok("POP3 server signing off").end_session())
    }
}

/// STLS (RFC 2595): flag the transport for a TLS upgrade. Authorization
/// state only; registered only when the pipeline has an upgrader.
pub struct StlsCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for StlsCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["STLS"]
    }

    async fn on_command(
        &self,
        session: &mut Pop3Session,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = require_state(session, Pop3State::Authorization) {
            return Ok(response);
        }
        if session.is_tls() {
            return Ok(reply::err("TLS already active"));
        }
        session.transport_mut().request_tls_upgrade();
        Ok(reply::ok("Begin TLS negotiation"))
    }
}

pub struct UnknownCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for UnknownCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &[tern_proto::chain::UNKNOWN_VERB]
    }

    async fn on_command(
        &self,
        _session: &mut Pop3Session,
        verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        Ok(reply::err(format!("Unknown command {verb}")))
    }
}
