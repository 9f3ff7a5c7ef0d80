use crate::chain::WiringError;
use crate::hooks::HookRegistry;
use crate::response::Response;
use async_trait::async_trait;

/// Cap applied to framed command lines unless the active line handler lifts
/// it (message data mode is exempt).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024;

/// Consumes one framed line.
///
/// Line handlers are stacked per connection; only the handler on top of the
/// stack receives lines. The command dispatcher sits at the bottom and is
/// never popped. Handlers that need modal input (DATA, AUTH continuations)
/// push themselves via the session and pop when the mode ends.
#[async_trait]
pub trait LineHandler<S: Send>: Send {
    /// Maximum accepted line length while this handler is on top of the
    /// stack. `None` lifts the cap entirely.
    fn max_line_length(&self) -> Option<usize> {
        Some(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Handle one line, stripped of its CRLF. `Ok(None)` means no reply is
    /// due yet. An `Err` is a transport-class fault: it is logged and the
    /// connection is closed without further output.
    async fn on_line(
        &mut self,
        session: &mut S,
        line: &[u8],
    ) -> anyhow::Result<Option<Response>>;
}

/// Implements one or more command verbs.
#[async_trait]
pub trait CommandHandler<S: Send>: Send + Sync {
    /// The verbs this handler owns, in canonical upper case.
    fn verbs(&self) -> &[&'static str];

    /// One-shot wiring pass: handlers interested in extension hooks pull
    /// their ordered provider list out of the registry here.
    fn wire(&mut self, _hooks: &HookRegistry) -> Result<(), WiringError> {
        Ok(())
    }

    /// Execute the command. `verb` is upper-cased; `args` is the verbatim
    /// remainder of the line, `None` when the verb stood alone.
    async fn on_command(
        &self,
        session: &mut S,
        verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response>;
}

/// Fires once per connection, before any command is read.
#[async_trait]
pub trait ConnectHandler<S: Send>: Send + Sync {
    /// May emit a greeting, or an immediate end-session reply to turn the
    /// client away.
    async fn on_connect(&self, session: &mut S) -> anyhow::Result<Option<Response>>;
}
