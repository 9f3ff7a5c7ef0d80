use crate::codes;
use crate::dsn::DsnStatus;
use crate::hook::MessageHook;
use crate::hookable::{merge_hook_results, synthesize_response};
use crate::reply;
use crate::session::SmtpSession;
use async_trait::async_trait;
use std::sync::Arc;
use tern_proto::{
    CommandHandler, HookRegistry, LineHandler, ProtocolSession, Response, WiringError,
};

/// Invoked once the end-of-data terminator arrives, with the accumulated,
/// unstuffed message. SMTP runs the MessageHook chain; LMTP substitutes a
/// per-recipient delivery strategy.
#[async_trait]
pub trait DataCompletion: Send + Sync {
    async fn message_complete(
        &self,
        session: &mut SmtpSession,
        message: Vec<u8>,
    ) -> anyhow::Result<Response>;
}

/// Sequence checks shared by the SMTP and LMTP DATA commands.
pub fn data_filter_checks(
    session: &SmtpSession,
    args: Option<&str>,
) -> Option<Response> {
    if session.sender().is_none() {
        return Some(reply::single(
            codes::BAD_SEQUENCE,
            Some(DsnStatus::permanent(5, 1)),
            "No sender specified",
        ));
    }
    if session.rcpt_count() == 0 {
        return Some(reply::single(
            codes::BAD_SEQUENCE,
            Some(DsnStatus::permanent(5, 1)),
            "No recipients specified",
        ));
    }
    if args.is_some_and(|a| !a.trim().is_empty()) {
        return Some(reply::single(
            codes::SYNTAX_ERROR_ARGUMENTS,
            Some(DsnStatus::permanent(5, 4)),
            "Unexpected argument provided with DATA",
        ));
    }
    None
}

pub fn start_data_response() -> Response {
    reply::single(
        codes::START_MAIL_INPUT,
        None,
        "Start mail input; end with <CRLF>.<CRLF>",
    )
}

/// DATA: switches the connection into message collection mode by pushing a
/// [`DataLineHandler`], then replies 354.
pub struct DataCmdHandler {
    hooks: Vec<Arc<dyn MessageHook>>,
}

impl DataCmdHandler {
    pub fn new() -> Self {
        Self { hooks: vec![] }
    }
}

impl Default for DataCmdHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHandler<SmtpSession> for DataCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["DATA"]
    }

    fn wire(&mut self, hooks: &HookRegistry) -> Result<(), WiringError> {
        self.hooks = hooks.get::<dyn MessageHook>();
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
            Arc::new(SmtpDataCompletion {
                hooks: self.hooks.clone(),
            }),
        )));
        Ok(start_data_response())
    }
}

/// Accumulates message lines until the lone-dot terminator.
///
/// Leading-dot unstuffing is applied to every other line starting with `.`.
/// The command-line length cap is lifted while this handler is on top of
/// the stack. When the configured maximum message size is exceeded the
/// handler keeps consuming (the client is mid-burst anyway) but discards,
/// and answers 552 at the terminator.
pub struct DataLineHandler {
    buffer: Vec<u8>,
    max_message_size: u64,
    oversized: bool,
    completion: Arc<dyn DataCompletion>,
}

impl DataLineHandler {
    pub fn new(max_message_size: u64, completion: Arc<dyn DataCompletion>) -> Self {
        Self {
            buffer: vec![],
            max_message_size,
            oversized: false,
            completion,
        }
    }
}

#[async_trait]
impl LineHandler<SmtpSession> for DataLineHandler {
    fn max_line_length(&self) -> Option<usize> {
        None
    }

    async fn on_line(
        &mut self,
        session: &mut SmtpSession,
        line: &[u8],
    ) -> anyhow::Result<Option<Response>> {
        if line == b"." {
            session.pop_line_handler();
            if self.oversized {
                session.reset_state();
                return Ok(Some(reply::single(
                    codes::QUOTA_EXCEEDED,
                    Some(DsnStatus::permanent(3, 4)),
                    "Message size exceeds fixed maximum message size",
                )));
            }
            let message = std::mem::take(&mut self.buffer);
            let response = self.completion.message_complete(session, message).await?;
            // back to the post-HELO state; the HELO mode survives
            session.reset_state();
            return Ok(Some(response));
        }

        let line = line.strip_prefix(b".").unwrap_or(line);
        let projected = self.buffer.len() + line.len() + 2;
        if self.max_message_size > 0 && projected as u64 > self.max_message_size {
            self.oversized = true;
            self.buffer.clear();
        } else {
            self.buffer.extend_from_slice(line);
            self.buffer.extend_from_slice(b"\r\n");
        }
        Ok(None)
    }
}

/// SMTP completion: run the MessageHook chain; the default reply accepts
/// the message.
pub struct SmtpDataCompletion {
    pub hooks: Vec<Arc<dyn MessageHook>>,
}

#[async_trait]
impl DataCompletion for SmtpDataCompletion {
    async fn message_complete(
        &self,
        session: &mut SmtpSession,
        message: Vec<u8>,
    ) -> anyhow::Result<Response> {
        let mut recorded = None;
        for hook in &self.hooks {
            let result = hook.on_message(session, &message).await;
            if !merge_hook_results(&mut recorded, result) {
                break;
            }
        }
        Ok(match recorded {
            Some(result) => synthesize_response(&result),
            None => reply::single(
                codes::MAIL_OK,
                Some(DsnStatus::success(6, 0)),
                "Message received",
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{HookResult, HookReturnCode};
    use crate::parser::{ForwardPath, ReversePath};
    use crate::session::test_support::session;
    use crate::session::HeloMode;
    use std::sync::Mutex;
    use tern_proto::StackOp;

    fn in_transaction() -> SmtpSession {
        let mut sess = session();
        sess.set_helo_mode(HeloMode::Ehlo);
        sess.set_pending_sender(ReversePath::NullSender);
        sess.commit_sender();
        sess.set_pending_rcpt(ForwardPath::Postmaster);
        sess.commit_rcpt();
        sess
    }

    struct CaptureHook {
        captured: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl MessageHook for CaptureHook {
        async fn on_message(
            &self,
            _session: &mut SmtpSession,
            message: &[u8],
        ) -> HookResult {
            self.captured.lock().unwrap().push(message.to_vec());
            HookResult::ok()
        }
    }

    #[tokio::test]
    async fn data_requires_sender_and_recipients() {
        let handler = DataCmdHandler::new();
        let mut sess = session();
        sess.set_helo_mode(HeloMode::Ehlo);
        let response = handler.on_command(&mut sess, "DATA", None).await.unwrap();
        assert_eq!(
            response.lines(),
            &["503 5.5.1 No sender specified".to_string()]
        );

        sess.set_pending_sender(ReversePath::NullSender);
        sess.commit_sender();
        let response = handler.on_command(&mut sess, "DATA", None).await.unwrap();
        assert_eq!(
            response.lines(),
            &["503 5.5.1 No recipients specified".to_string()]
        );
    }

    #[tokio::test]
    async fn dot_stuffed_body_round_trips() {
        let captured = Arc::new(Mutex::new(vec![]));
        let completion = Arc::new(SmtpDataCompletion {
            hooks: vec![Arc::new(CaptureHook {
                captured: captured.clone(),
            })],
        });
        let mut handler = DataLineHandler::new(0, completion);
        let mut sess = in_transaction();

        // lines as they appear on the wire, already stuffed by the client
        for line in [
            b"Subject: x".as_slice(),
            b"",
            b"..leading dot",
            b"...two dots",
            b"plain",
        ] {
            assert!(handler.on_line(&mut sess, line).await.unwrap().is_none());
        }
        let response = handler.on_line(&mut sess, b".").await.unwrap().unwrap();
        assert_eq!(response.ret_code(), "250");

        let captured = captured.lock().unwrap();
        assert_eq!(
            captured[0],
            b"Subject: x\r\n\r\n.leading dot\r\n..two dots\r\nplain\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn terminator_pops_the_handler_and_resets_state() {
        let completion = Arc::new(SmtpDataCompletion { hooks: vec![] });
        let mut handler = DataLineHandler::new(0, completion);
        let mut sess = in_transaction();

        handler.on_line(&mut sess, b"body").await.unwrap();
        let response = handler.on_line(&mut sess, b".").await.unwrap().unwrap();
        assert_eq!(
            response.lines(),
            &["250 2.6.0 Message received".to_string()]
        );

        // HELO mode carried over, transaction gone
        assert_eq!(sess.helo_mode(), Some(HeloMode::Ehlo));
        assert!(sess.sender().is_none());
        assert_eq!(sess.rcpt_count(), 0);

        let ops = sess.transport_mut().take_stack_ops();
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], StackOp::Pop));
    }

    #[tokio::test]
    async fn oversized_message_is_rejected_at_the_terminator() {
        let completion = Arc::new(SmtpDataCompletion { hooks: vec![] });
        let mut handler = DataLineHandler::new(16, completion);
        let mut sess = in_transaction();

        handler
            .on_line(&mut sess, b"0123456789abcdef0123")
            .await
            .unwrap();
        let response = handler.on_line(&mut sess, b".").await.unwrap().unwrap();
        assert_eq!(response.ret_code(), "552");
    }

    #[tokio::test]
    async fn message_hook_deny_is_reported() {
        struct DenyHook;

        #[async_trait]
        impl MessageHook for DenyHook {
            async fn on_message(
                &self,
                _session: &mut SmtpSession,
                _message: &[u8],
            ) -> HookResult {
                HookResult::with_response(
                    HookReturnCode::Deny,
                    codes::TRANSACTION_FAILED,
                    DsnStatus::permanent(7, 1),
                    "Message refused",
                )
            }
        }

        let completion = Arc::new(SmtpDataCompletion {
            hooks: vec![Arc::new(DenyHook)],
        });
        let mut handler = DataLineHandler::new(0, completion);
        let mut sess = in_transaction();
        handler.on_line(&mut sess, b"body").await.unwrap();
        let response = handler.on_line(&mut sess, b".").await.unwrap().unwrap();
        assert_eq!(
            response.lines(),
            &["554 5.7.1 Message refused".to_string()]
        );
    }
}
