use crate::codes;
use crate::reply;
use crate::session::SmtpSession;
use async_trait::async_trait;
use tern_proto::{ConnectHandler, Response};

/// Emits the 220 service greeting when a client connects.
pub struct WelcomeMessageHandler;

#[async_trait]
impl ConnectHandler<SmtpSession> for WelcomeMessageHandler {
    async fn on_connect(&self, session: &mut SmtpSession) -> anyhow::Result<Option<Response>> {
        Ok(Some(reply::single(
            codes::SERVICE_READY,
            None,
            session.greeting(),
        )))
    }
}
