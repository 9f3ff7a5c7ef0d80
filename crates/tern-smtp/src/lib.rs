//! SMTP (RFC 5321) on top of the tern protocol core.
//!
//! The crate supplies the SMTP session with its two-tier state and reset
//! semantics, the reply-code and enhanced-status vocabulary, a grammar for
//! command arguments, the hookable command template, and the core command
//! handlers. [`chain::SmtpPipelineBuilder`] assembles everything into a
//! pipeline that `tern-server` can bind.

pub mod chain;
pub mod codes;
pub mod config;
pub mod core;
pub mod dns;
pub mod dsn;
pub mod fastfail;
pub mod hook;
pub mod hookable;
pub mod parser;
pub mod reply;
pub mod session;

pub use chain::{SmtpPipeline, SmtpPipelineBuilder};
pub use config::{CidrSet, SmtpConfig};
pub use dns::{DnsError, DnsService};
pub use dsn::DsnStatus;
pub use hook::{
    AuthHook, HeloHook, HookResult, HookReturnCode, MailHook, MessageHook, QuitHook,
    RcptHook,
};
pub use parser::{Domain, EsmtpParameter, ForwardPath, MailPath, Mailbox, ReversePath};
pub use session::{HeloMode, SmtpSession};
