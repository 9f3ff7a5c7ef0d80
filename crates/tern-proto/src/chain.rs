use crate::dispatcher::CommandDispatcher;
use crate::handler::{CommandHandler, ConnectHandler};
use crate::hooks::HookRegistry;
use crate::response::Response;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// The verb under which every protocol registers its fallback handler.
pub const UNKNOWN_VERB: &str = "UNKNOWN";

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("handlers cannot be added after the chain has been wired")]
    AlreadyWired,
    #[error("the chain has not been wired yet")]
    NotWired,
    #[error("duplicate command handler for verb {0}")]
    DuplicateVerb(String),
    #[error("no UNKNOWN command handler registered")]
    MissingUnknownHandler,
}

/// Ordered registry of the handlers that make up one protocol.
///
/// Handlers are added in the order they should be consulted, then
/// [`wire_extensible_handlers`](Self::wire_extensible_handlers) performs the
/// one-shot wiring pass: every command handler receives the hook providers
/// it is interested in, the verb table is built and checked for duplicates,
/// and the chain freezes. Adding anything afterwards is a wiring error.
pub struct ProtocolHandlerChain<S: Send> {
    connect: Vec<Arc<dyn ConnectHandler<S>>>,
    pending_commands: Vec<Box<dyn CommandHandler<S>>>,
    hooks: HookRegistry,
    commands: HashMap<String, Arc<dyn CommandHandler<S>>>,
    unknown: Option<Arc<dyn CommandHandler<S>>>,
    wired: bool,
}

impl<S: Send + 'static> Default for ProtocolHandlerChain<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + 'static> ProtocolHandlerChain<S> {
    pub fn new() -> Self {
        Self {
            connect: vec![],
            pending_commands: vec![],
            hooks: HookRegistry::new(),
            commands: HashMap::new(),
            unknown: None,
            wired: false,
        }
    }

    pub fn add_connect_handler(
        &mut self,
        handler: Arc<dyn ConnectHandler<S>>,
    ) -> Result<(), WiringError> {
        self.ensure_unwired()?;
        self.connect.push(handler);
        Ok(())
    }

    pub fn add_command_handler(
        &mut self,
        handler: Box<dyn CommandHandler<S>>,
    ) -> Result<(), WiringError> {
        self.ensure_unwired()?;
        self.pending_commands.push(handler);
        Ok(())
    }

    /// Register an extension hook provider for hook type `H`.
    pub fn add_hook<H: ?Sized + Send + Sync + 'static>(
        &mut self,
        hook: Arc<H>,
    ) -> Result<(), WiringError> {
        self.ensure_unwired()?;
        self.hooks.add(hook);
        Ok(())
    }

    /// One-shot wiring pass; freezes the chain.
    pub fn wire_extensible_handlers(&mut self) -> Result<(), WiringError> {
        self.ensure_unwired()?;
        for mut handler in self.pending_commands.drain(..) {
            handler.wire(&self.hooks)?;
            let handler: Arc<dyn CommandHandler<S>> = Arc::from(handler);
            for verb in handler.verbs() {
                let verb = verb.to_ascii_uppercase();
                if self.commands.insert(verb.clone(), handler.clone()).is_some() {
                    return Err(WiringError::DuplicateVerb(verb));
                }
            }
        }
        self.unknown = self.commands.remove(UNKNOWN_VERB);
        if self.unknown.is_none() {
            return Err(WiringError::MissingUnknownHandler);
        }
        self.wired = true;
        Ok(())
    }

    pub fn is_wired(&self) -> bool {
        self.wired
    }

    pub fn connect_handlers(&self) -> &[Arc<dyn ConnectHandler<S>>] {
        &self.connect
    }

    /// Build the command dispatcher for this chain. `fault_response` is the
    /// generic reply used when a command handler fails unexpectedly.
    pub fn dispatcher(
        &self,
        fault_response: Response,
    ) -> Result<CommandDispatcher<S>, WiringError> {
        if !self.wired {
            return Err(WiringError::NotWired);
        }
        let unknown = self.unknown.clone().ok_or(WiringError::MissingUnknownHandler)?;
        Ok(CommandDispatcher::new(
            self.commands.clone(),
            unknown,
            fault_response,
        ))
    }

    fn ensure_unwired(&self) -> Result<(), WiringError> {
        if self.wired {
            Err(WiringError::AlreadyWired)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ConnectionInfo, ProtocolSession, TransportHandle};
    use async_trait::async_trait;

    struct TestSession {
        transport: TransportHandle<Self>,
    }

    impl TestSession {
        fn new() -> Self {
            let addr = "127.0.0.1:0".parse().unwrap();
            Self {
                transport: TransportHandle::new(ConnectionInfo {
                    local: addr,
                    peer: addr,
                }),
            }
        }
    }

    impl ProtocolSession for TestSession {
        fn transport(&self) -> &TransportHandle<Self> {
            &self.transport
        }

        fn transport_mut(&mut self) -> &mut TransportHandle<Self> {
            &mut self.transport
        }
    }

    struct FixedHandler {
        verbs: &'static [&'static str],
    }

    #[async_trait]
    impl CommandHandler<TestSession> for FixedHandler {
        fn verbs(&self) -> &[&'static str] {
            self.verbs
        }

        async fn on_command(
            &self,
            _session: &mut TestSession,
            verb: &str,
            _args: Option<&str>,
        ) -> anyhow::Result<Response> {
            Ok(Response::with_line("250", format!("250 {verb}")))
        }
    }

    fn unknown_handler() -> Box<dyn CommandHandler<TestSession>> {
        Box::new(FixedHandler {
            verbs: &[UNKNOWN_VERB],
        })
    }

    #[test]
    fn wiring_requires_unknown_handler() {
        let mut chain = ProtocolHandlerChain::<TestSession>::new();
        chain
            .add_command_handler(Box::new(FixedHandler { verbs: &["NOOP"] }))
            .unwrap();
        assert!(matches!(
            chain.wire_extensible_handlers(),
            Err(WiringError::MissingUnknownHandler)
        ));
    }

    #[test]
    fn duplicate_verb_is_a_wiring_error() {
        let mut chain = ProtocolHandlerChain::<TestSession>::new();
        chain
            .add_command_handler(Box::new(FixedHandler { verbs: &["NOOP"] }))
            .unwrap();
        chain
            .add_command_handler(Box::new(FixedHandler { verbs: &["NOOP"] }))
            .unwrap();
        chain.add_command_handler(unknown_handler()).unwrap();
        assert!(matches!(
            chain.wire_extensible_handlers(),
            Err(WiringError::DuplicateVerb(v)) if v == "NOOP"
        ));
    }

    #[test]
    fn add_after_wiring_fails() {
        let mut chain = ProtocolHandlerChain::<TestSession>::new();
        chain.add_command_handler(unknown_handler()).unwrap();
        chain.wire_extensible_handlers().unwrap();
        assert!(matches!(
            chain.add_command_handler(unknown_handler()),
            Err(WiringError::AlreadyWired)
        ));
        assert!(matches!(
            chain.wire_extensible_handlers(),
            Err(WiringError::AlreadyWired)
        ));
    }

    #[test]
    fn dispatcher_requires_wiring() {
        let chain = ProtocolHandlerChain::<TestSession>::new();
        assert!(matches!(
            chain.dispatcher(Response::with_line("451", "451 fault")),
            Err(WiringError::NotWired)
        ));
    }

    #[tokio::test]
    async fn dispatcher_routes_after_wiring() {
        use crate::handler::LineHandler;

        let mut chain = ProtocolHandlerChain::<TestSession>::new();
        chain
            .add_command_handler(Box::new(FixedHandler { verbs: &["NOOP"] }))
            .unwrap();
        chain.add_command_handler(unknown_handler()).unwrap();
        chain.wire_extensible_handlers().unwrap();

        let mut dispatcher = chain
            .dispatcher(Response::with_line("451", "451 fault"))
            .unwrap();
        let mut session = TestSession::new();
        let response = dispatcher
            .on_line(&mut session, b"noop")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.lines(), &["250 NOOP".to_string()]);
    }
}
