use crate::codes;
use crate::dsn::DsnStatus;
use crate::hook::{AuthHook, HookResult, HookReturnCode};
use crate::hookable::{merge_hook_results, synthesize_response};
use crate::reply;
use crate::session::SmtpSession;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use tern_proto::{
    AuthBackend, CommandHandler, HookRegistry, LineHandler, ProtocolSession, Response,
    WiringError,
};

/// AUTH: PLAIN only, with either an initial response on the command line or
/// a 334 continuation. `*` in the continuation cancels the exchange.
pub struct AuthCmdHandler {
    hooks: Vec<Arc<dyn AuthHook>>,
}

impl AuthCmdHandler {
    pub fn new() -> Self {
        Self { hooks: vec![] }
    }
}

impl Default for AuthCmdHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHandler<SmtpSession> for AuthCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["AUTH"]
    }

    fn wire(&mut self, hooks: &HookRegistry) -> Result<(), WiringError> {
        self.hooks = hooks.get::<dyn AuthHook>();
        Ok(())
    }

    async fn on_command(
        &self,
        session: &mut SmtpSession,
        _verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if session.authenticated().is_some() {
            return Ok(reply::single(
                codes::BAD_SEQUENCE,
                Some(DsnStatus::permanent(5, 1)),
                "Already authenticated",
            ));
        }
        let args = args.map(str::trim).unwrap_or_default();
        let (mechanism, initial) = match args.split_once(' ') {
            Some((mech, rest)) => (mech, Some(rest.trim())),
            None => (args, None),
        };
        if !mechanism.eq_ignore_ascii_case("PLAIN") {
            return Ok(reply::single(
                codes::PARAMETER_NOT_IMPLEMENTED,
                Some(DsnStatus::permanent(5, 4)),
                "Unrecognized authentication type",
            ));
        }

        match initial {
            Some(initial) => Ok(process_plain(session, initial, &self.hooks).await),
            None => {
                session.push_line_handler(Box::new(AuthPlainLineHandler {
                    hooks: self.hooks.clone(),
                }));
                Ok(reply::single(codes::AUTH_CONTINUE, None, ""))
            }
        }
    }
}

/// Reads the single continuation line of an AUTH PLAIN exchange.
struct AuthPlainLineHandler {
    hooks: Vec<Arc<dyn AuthHook>>,
}

#[async_trait]
impl LineHandler<SmtpSession> for AuthPlainLineHandler {
    async fn on_line(
        &mut self,
        session: &mut SmtpSession,
        line: &[u8],
    ) -> anyhow::Result<Option<Response>> {
        session.pop_line_handler();
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line == "*" {
            return Ok(Some(reply::single(
                codes::SYNTAX_ERROR_ARGUMENTS,
                Some(DsnStatus::permanent(0, 0)),
                "Authentication cancelled",
            )));
        }
        Ok(Some(process_plain(session, line, &self.hooks).await))
    }
}

/// Decode a SASL PLAIN response (`authzid NUL authcid NUL passwd`) and run
/// the AuthHook chain over the credentials.
async fn process_plain(
    session: &mut SmtpSession,
    encoded: &str,
    hooks: &[Arc<dyn AuthHook>],
) -> Response {
    let Some((authcid, password)) = decode_sasl_plain(encoded) else {
        return reply::single(
            codes::SYNTAX_ERROR_ARGUMENTS,
            Some(DsnStatus::permanent(5, 2)),
            "Could not decode AUTH PLAIN parameters",
        );
    };

    let mut recorded = None;
    for hook in hooks {
        let result = hook.do_auth(session, &authcid, &password).await;
        if !merge_hook_results(&mut recorded, result) {
            break;
        }
    }

    match recorded {
        Some(result) if result.code == HookReturnCode::Ok => {
            if session.authenticated().is_none() {
                session.set_authenticated(authcid.clone());
            }
            reply::single(
                codes::AUTH_SUCCESSFUL,
                Some(DsnStatus::success(7, 0)),
                "Authentication successful",
            )
        }
        Some(result) => synthesize_response(&result),
        // no hook claimed the credentials
        None => auth_failed(),
    }
}

fn auth_failed() -> Response {
    reply::single(
        codes::AUTH_FAILED,
        Some(DsnStatus::permanent(7, 8)),
        "Authentication credentials invalid",
    )
}

fn decode_sasl_plain(encoded: &str) -> Option<(String, String)> {
    let decoded = BASE64.decode(encoded.as_bytes()).ok()?;
    let mut parts = decoded.split(|&b| b == 0);
    let _authzid = parts.next()?;
    let authcid = String::from_utf8(parts.next()?.to_vec()).ok()?;
    let password = String::from_utf8(parts.next()?.to_vec()).ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((authcid, password))
}

/// Adapter that lets an [`AuthBackend`] participate in the AuthHook chain.
pub struct AuthBackendHook {
    backend: Arc<dyn AuthBackend>,
}

impl AuthBackendHook {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl AuthHook for AuthBackendHook {
    async fn do_auth(
        &self,
        session: &mut SmtpSession,
        username: &str,
        credential: &str,
    ) -> HookResult {
        match self.backend.authenticate(username, credential).await {
            Ok(Some(identity)) => {
                session.set_authenticated(identity);
                HookResult::ok()
            }
            Ok(None) => HookResult::with_response(
                HookReturnCode::Deny,
                codes::AUTH_FAILED,
                DsnStatus::permanent(7, 8),
                "Authentication credentials invalid",
            ),
            Err(err) => {
                tracing::warn!("auth backend failed: {err:#}");
                HookResult::with_response(
                    HookReturnCode::DenySoft,
                    codes::AUTH_TEMPORARY_FAILURE,
                    DsnStatus::temporary(7, 0),
                    "Temporary authentication failure",
                )
            }
        }
    }
}
