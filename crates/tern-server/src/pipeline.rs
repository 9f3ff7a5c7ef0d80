use crate::io::TlsUpgrader;
use std::sync::Arc;
use tern_proto::{ConnectHandler, ConnectionInfo, LineHandler, ProtocolSession, Response};

/// Builds the per-connection processing chain for one protocol.
///
/// The server holds one pipeline per listener; for each accepted socket it
/// creates a fresh session, seeds the line-handler stack with the protocol's
/// command dispatcher and runs the connect handlers. The pipeline also
/// supplies the protocol-specific transport replies the driver needs when it
/// has to speak for itself (idle timeout, overlong line).
pub trait ProtocolPipeline: Send + Sync + 'static {
    type Session: ProtocolSession;

    fn create_session(&self, info: ConnectionInfo) -> Self::Session;

    /// Bottom entry of the line-handler stack; never popped.
    fn dispatcher(&self) -> Box<dyn LineHandler<Self::Session>>;

    fn connect_handlers(&self) -> Vec<Arc<dyn ConnectHandler<Self::Session>>>;

    /// Reply emitted when the idle deadline expires, before closing.
    fn timeout_response(&self) -> Response;

    /// Reply emitted when a command line exceeds the length cap.
    fn line_too_long_response(&self) -> Response;

    fn tls_upgrader(&self) -> Option<Arc<dyn TlsUpgrader>> {
        None
    }
}
