//! POP3 (RFC 1939, STLS per RFC 2595) on top of the tern protocol core.
//!
//! The session walks the Authorization → Transaction → Update states; the
//! maildrop itself stays behind the [`Mailbox`]/[`MailboxFactory`] seams.
//! Multi-line replies are dot-stuffed and terminated with a lone dot, as
//! the RFC requires.

pub mod chain;
pub mod config;
pub mod core;
pub mod mailbox;
pub mod reply;
pub mod session;

pub use chain::{Pop3Pipeline, Pop3PipelineBuilder};
pub use config::Pop3Config;
pub use mailbox::{Mailbox, MailboxError, MailboxFactory, MessageInfo};
pub use session::{Pop3Session, Pop3State};
