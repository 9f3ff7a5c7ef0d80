use crate::core::require_state;
use crate::mailbox::{MailboxError, MailboxFactory};
use crate::reply;
use crate::session::{Pop3Session, Pop3State};
use async_trait::async_trait;
use std::sync::Arc;
use tern_proto::{AuthBackend, CommandHandler, Response};

/// USER: record the name; the maildrop opens on PASS.
pub struct UserCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for UserCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["USER"]
    }

    async fn on_command(
        &self,
        session: &mut Pop3Session,
        _verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = require_state(session, Pop3State::Authorization) {
            return Ok(response);
        }
        let Some(name) = args.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(reply::err("Usage: USER name"));
        };
        session.set_username(name);
        Ok(reply::ok(""))
    }
}

/// PASS: verify the credentials, lock the maildrop, snapshot the listing
/// and advance to the Transaction state.
pub struct PassCmdHandler {
    backend: Arc<dyn AuthBackend>,
    factory: Arc<dyn MailboxFactory>,
}

impl PassCmdHandler {
    pub fn new(backend: Arc<dyn AuthBackend>, factory: Arc<dyn MailboxFactory>) -> Self {
        Self { backend, factory }
    }
}

#[async_trait]
impl CommandHandler<Pop3Session> for PassCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["PASS"]
    }

    async fn on_command(
        &self,
        session: &mut Pop3Session,
        _verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = require_state(session, Pop3State::Authorization) {
            return Ok(response);
        }
        let Some(username) = session.username().map(str::to_string) else {
            return Ok(reply::err("USER required before PASS"));
        };
        let Some(password) = args else {
            return Ok(reply::err("Usage: PASS password"));
        };

        let identity = match self.backend.authenticate(&username, password).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                // let the client retry from USER
                session.set_state(Pop3State::Authorization);
                return Ok(reply::err("Authentication failed"));
            }
            Err(err) => {
                tracing::warn!("auth backend failed for {username}: {err:#}");
                return Ok(reply::err("Temporary authentication failure"));
            }
        };

        let mailbox = match self.factory.open(&identity).await {
            Ok(mailbox) => mailbox,
            Err(MailboxError::InUse) => {
                return Ok(reply::err("maildrop already locked"));
            }
            Err(MailboxError::Unavailable(reason)) => {
                tracing::error!("maildrop for {identity} unavailable: {reason}");
                return Ok(reply::err("Service not available").end_session());
            }
        };

        let messages = mailbox.list().await?;
        let count = messages.len();
        let size: u64 = messages.iter().map(|m| m.size).sum();
        session.attach_mailbox(mailbox, messages);
        Ok(reply::ok(format!("{count} messages ({size} octets)")))
    }
}
