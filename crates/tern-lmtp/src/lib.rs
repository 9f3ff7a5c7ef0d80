//! LMTP (RFC 2033) on top of the SMTP implementation.
//!
//! LMTP reuses the SMTP session, state model and most command handlers;
//! the differences are concentrated here: LHLO replaces HELO/EHLO, and the
//! end-of-data terminator yields one reply per accepted recipient, wrapped
//! in an [`LmtpMultiResponse`].

pub mod chain;
pub mod delivery;
pub mod lhlo;
pub mod response;

pub use chain::{LmtpPipeline, LmtpPipelineBuilder};
pub use delivery::{DeliverToRecipientHook, LmtpDataCmdHandler, LmtpDataCompletion};
pub use lhlo::{HeloNotSupportedCmdHandler, LhloCmdHandler};
pub use response::LmtpMultiResponse;
