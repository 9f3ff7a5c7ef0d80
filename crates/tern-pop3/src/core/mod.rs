//! The core POP3 command handlers.

mod authorization;
mod misc;
mod transaction;

pub use authorization::{PassCmdHandler, UserCmdHandler};
pub use misc::{
    CapaCmdHandler, NoopCmdHandler, QuitCmdHandler, RsetCmdHandler, StlsCmdHandler,
    UnknownCmdHandler, WelcomeMessageHandler,
};
pub use transaction::{
    DeleCmdHandler, ListCmdHandler, RetrCmdHandler, StatCmdHandler, TopCmdHandler,
    UidlCmdHandler,
};

use crate::reply;
use crate::session::{Pop3Session, Pop3State};
use tern_proto::Response;

/// The in-a-wrong-state reply shared by every handler.
pub(crate) fn require_state(session: &Pop3Session, state: Pop3State) -> Option<Response> {
    if session.state() == state {
        None
    } else {
        Some(reply::err("Command not permitted in this state"))
    }
}
