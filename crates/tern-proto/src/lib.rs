//! Protocol-agnostic building blocks for line-oriented mail servers.
//!
//! A protocol implementation is assembled from a [`ProtocolHandlerChain`]:
//! an ordered registry of connect handlers, command handlers and typed
//! extension hooks. Once the chain is wired, the [`CommandDispatcher`] sits
//! at the bottom of each connection's line-handler stack and routes framed
//! lines to the command handler that owns the verb. Commands that need modal
//! input (message data, authentication continuations) push additional
//! [`LineHandler`]s onto the stack via their session.
//!
//! The transport that drives the stack lives in `tern-server`; SMTP, LMTP
//! and POP3 semantics live in their own crates on top of this one.

pub mod auth;
pub mod chain;
pub mod dispatcher;
pub mod handler;
pub mod hooks;
pub mod response;
pub mod session;

pub use auth::AuthBackend;
pub use chain::{ProtocolHandlerChain, WiringError};
pub use dispatcher::CommandDispatcher;
pub use handler::{
    CommandHandler, ConnectHandler, LineHandler, DEFAULT_MAX_LINE_LENGTH,
};
pub use hooks::HookRegistry;
pub use response::Response;
pub use session::{
    ConnectionInfo, Extensions, ProtocolSession, StackOp, TlsStatus, TransportHandle,
};
