use crate::response::LmtpMultiResponse;
use async_trait::async_trait;
use std::sync::Arc;
use tern_proto::{
    CommandHandler, HookRegistry, ProtocolSession, Response, WiringError,
};
use tern_smtp::core::{
    data_filter_checks, start_data_response, DataCompletion, DataLineHandler,
};
use tern_smtp::hookable::{merge_hook_results, synthesize_response};
use tern_smtp::{
    codes, dsn::DsnStatus, reply, ForwardPath, HookResult, HookReturnCode, SmtpSession,
};

/// Delivery attempt for a single recipient of a completed LMTP message.
#[async_trait]
pub trait DeliverToRecipientHook: Send + Sync {
    async fn deliver(
        &self,
        session: &mut SmtpSession,
        recipient: &ForwardPath,
        message: &[u8],
    ) -> HookResult;
}

/// LMTP DATA: same sequence checks and collection mode as SMTP, but the
/// completion produces one reply per recipient.
pub struct LmtpDataCmdHandler {
    hooks: Vec<Arc<dyn DeliverToRecipientHook>>,
}

impl LmtpDataCmdHandler {
    pub fn new() -> Self {
        Self { hooks: vec![] }
    }
}

impl Default for LmtpDataCmdHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHandler<SmtpSession> for LmtpDataCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["DATA"]
    }

    fn wire(&mut self, hooks: &HookRegistry) -> Result<(), WiringError> {
        self.hooks = hooks.get::<dyn DeliverToRecipientHook>();
        Ok(())
    }

    async fn on_command(
        &self,
        session: &mut SmtpSession,
        _verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = data_filter_checks(session, args) {
            return Ok(response);
        }
        session.push_line_handler(Box::new(DataLineHandler::new(
            session.max_message_size(),
            Arc::new(LmtpDataCompletion {
                hooks: self.hooks.clone(),
            }),
        )));
        Ok(start_data_response())
    }
}

/// Runs the delivery hooks once per recipient and wraps the replies in a
/// multi-response, preserving recipient order.
pub struct LmtpDataCompletion {
    pub hooks: Vec<Arc<dyn DeliverToRecipientHook>>,
}

impl LmtpDataCompletion {
    fn recipient_response(result: Option<HookResult>, recipient: &ForwardPath) -> Response {
        match result {
            Some(result) if result.code == HookReturnCode::Ok => {
                // an explicit OK may carry its own reply text
                if result.smtp_code.is_some() || result.message.is_some() {
                    synthesize_response(&result)
                } else {
                    Self::default_accept(recipient)
                }
            }
            Some(result) => synthesize_response(&result),
            None => Self::default_accept(recipient),
        }
    }

    fn default_accept(recipient: &ForwardPath) -> Response {
        reply::single(
            codes::MAIL_OK,
            Some(DsnStatus::success(1, 5)),
            format!("OK <{recipient}> message accepted"),
        )
    }
}

#[async_trait]
impl DataCompletion for LmtpDataCompletion {
    async fn message_complete(
        &self,
        session: &mut SmtpSession,
        message: Vec<u8>,
    ) -> anyhow::Result<Response> {
        let recipients = session.rcpt_list().to_vec();
        let mut multi: Option<LmtpMultiResponse> = None;
        for recipient in &recipients {
            let mut recorded = None;
            for hook in &self.hooks {
                let result = hook.deliver(session, recipient, &message).await;
                if !merge_hook_results(&mut recorded, result) {
                    break;
                }
            }
            let response = Self::recipient_response(recorded, recipient);
            match multi.as_mut() {
                Some(multi) => multi.add_response(response),
                None => multi = Some(LmtpMultiResponse::new(response)),
            }
        }
        let multi = multi.expect("DATA requires at least one recipient");
        Ok(multi.into_response())
    }
}
