//! The core SMTP command handlers.

mod auth;
mod data;
mod helo;
mod mail;
mod misc;
mod rcpt;
mod starttls;
mod welcome;

pub use auth::{AuthBackendHook, AuthCmdHandler};
pub use data::{
    data_filter_checks, start_data_response, DataCmdHandler, DataCompletion,
    DataLineHandler, SmtpDataCompletion,
};
pub use helo::{extended_greeting, helo_filter_checks, EhloCmdHandler, HeloCmdHandler};
pub use mail::MailCmdHandler;
pub use misc::{
    NoopCmdHandler, QuitCmdHandler, RsetCmdHandler, UnknownCmdHandler, VrfyCmdHandler,
};
pub use rcpt::{AuthRequiredToRelayRcptHook, RcptCmdHandler};
pub use starttls::StartTlsCmdHandler;
pub use welcome::WelcomeMessageHandler;
