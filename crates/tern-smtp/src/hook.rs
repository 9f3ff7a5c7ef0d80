use crate::dsn::DsnStatus;
use crate::parser::{ForwardPath, ReversePath};
use crate::session::SmtpSession;
use async_trait::async_trait;

/// Outcome of one hook invocation, dictating whether the chain continues
/// and what reply (if any) the hook wants on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookReturnCode {
    /// Accept and take ownership of the reply; later hooks still run but a
    /// later DECLINED cannot override this.
    Ok,
    /// No opinion; the chain continues.
    Declined,
    /// Permanent failure; the chain stops.
    Deny,
    /// Temporary failure; the chain stops.
    DenySoft,
    /// Stop and drop the connection.
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct HookResult {
    pub code: HookReturnCode,
    pub smtp_code: Option<u16>,
    pub dsn: Option<DsnStatus>,
    pub message: Option<String>,
}

impl HookResult {
    pub fn new(code: HookReturnCode) -> Self {
        Self {
            code,
            smtp_code: None,
            dsn: None,
            message: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(HookReturnCode::Ok)
    }

    pub fn declined() -> Self {
        Self::new(HookReturnCode::Declined)
    }

    pub fn deny() -> Self {
        Self::new(HookReturnCode::Deny)
    }

    pub fn deny_soft() -> Self {
        Self::new(HookReturnCode::DenySoft)
    }

    pub fn disconnect() -> Self {
        Self::new(HookReturnCode::Disconnect)
    }

    /// Attach the reply the synthesized response should use.
    pub fn with_response(
        code: HookReturnCode,
        smtp_code: u16,
        dsn: DsnStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            smtp_code: Some(smtp_code),
            dsn: Some(dsn),
            message: Some(message.into()),
        }
    }
}

/// Consulted when the client introduces itself with HELO/EHLO/LHLO.
#[async_trait]
pub trait HeloHook: Send + Sync {
    async fn do_helo(&self, session: &mut SmtpSession, helo_name: &str) -> HookResult;
}

/// Consulted for MAIL FROM, after the address parsed.
#[async_trait]
pub trait MailHook: Send + Sync {
    async fn do_mail(&self, session: &mut SmtpSession, sender: &ReversePath) -> HookResult;
}

/// Consulted for each RCPT TO.
#[async_trait]
pub trait RcptHook: Send + Sync {
    async fn do_rcpt(&self, session: &mut SmtpSession, recipient: &ForwardPath)
        -> HookResult;
}

/// Consulted once the DATA terminator arrives, with the unstuffed message.
#[async_trait]
pub trait MessageHook: Send + Sync {
    async fn on_message(&self, session: &mut SmtpSession, message: &[u8]) -> HookResult;
}

/// Consulted with decoded AUTH credentials.
#[async_trait]
pub trait AuthHook: Send + Sync {
    async fn do_auth(
        &self,
        session: &mut SmtpSession,
        username: &str,
        credential: &str,
    ) -> HookResult;
}

/// Consulted when the client says QUIT, before the goodbye reply.
#[async_trait]
pub trait QuitHook: Send + Sync {
    async fn do_quit(&self, session: &mut SmtpSession) -> HookResult;
}
