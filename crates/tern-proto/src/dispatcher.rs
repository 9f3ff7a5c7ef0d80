use crate::handler::{CommandHandler, LineHandler, DEFAULT_MAX_LINE_LENGTH};
use crate::response::Response;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes framed lines to command handlers.
///
/// The dispatcher sits at the bottom of every connection's line-handler
/// stack. It splits the first whitespace-delimited token off as the verb,
/// upper-cases it, and hands the verbatim remainder to the owning handler,
/// or to the protocol's UNKNOWN handler when no verb matches. It inspects
/// neither arguments nor session state.
pub struct CommandDispatcher<S: Send> {
    commands: HashMap<String, Arc<dyn CommandHandler<S>>>,
    unknown: Arc<dyn CommandHandler<S>>,
    fault_response: Response,
    max_line_length: usize,
}

impl<S: Send> CommandDispatcher<S> {
    pub(crate) fn new(
        commands: HashMap<String, Arc<dyn CommandHandler<S>>>,
        unknown: Arc<dyn CommandHandler<S>>,
        fault_response: Response,
    ) -> Self {
        Self {
            commands,
            unknown,
            fault_response,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Override the command-line length cap advertised to the transport.
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }
}

impl<S: Send> Clone for CommandDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            unknown: self.unknown.clone(),
            fault_response: self.fault_response.clone(),
            max_line_length: self.max_line_length,
        }
    }
}

#[async_trait]
impl<S: Send + 'static> LineHandler<S> for CommandDispatcher<S> {
    fn max_line_length(&self) -> Option<usize> {
        Some(self.max_line_length)
    }

    async fn on_line(
        &mut self,
        session: &mut S,
        line: &[u8],
    ) -> anyhow::Result<Option<Response>> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        tracing::trace!("> {line}");

        let (verb, args) = match line.find(char::is_whitespace) {
            Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
            None => (line, None),
        };
        let verb = verb.to_ascii_uppercase();
        let handler = self.commands.get(&verb).unwrap_or(&self.unknown).clone();

        match handler.on_command(session, &verb, args).await {
            Ok(response) => Ok(Some(response)),
            Err(err) => {
                tracing::error!("command {verb} failed: {err:#}");
                Ok(Some(self.fault_response.clone()))
            }
        }
    }
}
