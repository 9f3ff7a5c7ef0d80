//! Default POP3 handler chain and pipeline assembly.

use crate::config::Pop3Config;
use crate::core::{
    CapaCmdHandler, DeleCmdHandler, ListCmdHandler, NoopCmdHandler, PassCmdHandler,
    QuitCmdHandler, RetrCmdHandler, RsetCmdHandler, StatCmdHandler, StlsCmdHandler,
    TopCmdHandler, UidlCmdHandler, UnknownCmdHandler, UserCmdHandler,
    WelcomeMessageHandler,
};
use crate::mailbox::MailboxFactory;
use crate::reply;
use crate::session::Pop3Session;
use std::sync::Arc;
use tern_proto::{
    AuthBackend, CommandDispatcher, ConnectHandler, ConnectionInfo, LineHandler,
    ProtocolHandlerChain, Response, WiringError,
};
use tern_server::{ProtocolPipeline, TlsUpgrader};

/// Assembles the default POP3 chain, mirroring the classic handler lineup:
/// CAPA, USER, PASS, LIST, UIDL, RSET, DELE, NOOP, RETR, TOP, STAT, QUIT,
/// the welcome greeting, the unknown fallback and (when TLS is available)
/// STLS.
pub struct Pop3PipelineBuilder {
    config: Pop3Config,
    auth_backend: Arc<dyn AuthBackend>,
    mailbox_factory: Arc<dyn MailboxFactory>,
    tls_upgrader: Option<Arc<dyn TlsUpgrader>>,
}

impl Pop3PipelineBuilder {
    pub fn new(
        config: Pop3Config,
        auth_backend: Arc<dyn AuthBackend>,
        mailbox_factory: Arc<dyn MailboxFactory>,
    ) -> Self {
        Self {
            config,
            auth_backend,
            mailbox_factory,
            tls_upgrader: None,
        }
    }

    pub fn with_tls_upgrader(mut self, upgrader: Arc<dyn TlsUpgrader>) -> Self {
        self.tls_upgrader = Some(upgrader);
        self
    }

    pub fn build(self) -> Result<Pop3Pipeline, WiringError> {
        let offer_stls = self.tls_upgrader.is_some();

        let mut chain = ProtocolHandlerChain::new();
        chain.add_connect_handler(Arc::new(WelcomeMessageHandler))?;

        chain.add_command_handler(Box::new(CapaCmdHandler::new(offer_stls)))?;
        chain.add_command_handler(Box::new(UserCmdHandler))?;
        chain.add_command_handler(Box::new(PassCmdHandler::new(
            self.auth_backend.clone(),
            self.mailbox_factory.clone(),
        )))?;
        chain.add_command_handler(Box::new(ListCmdHandler))?;
        chain.add_command_handler(Box::new(UidlCmdHandler))?;
        chain.add_command_handler(Box::new(RsetCmdHandler))?;
        chain.add_command_handler(Box::new(DeleCmdHandler))?;
        chain.add_command_handler(Box::new(NoopCmdHandler))?;
        chain.add_command_handler(Box::new(RetrCmdHandler))?;
        chain.add_command_handler(Box::new(TopCmdHandler))?;
        chain.add_command_handler(Box::new(StatCmdHandler))?;
        chain.add_command_handler(Box::new(QuitCmdHandler))?;
        chain.add_command_handler(Box::new(UnknownCmdHandler))?;
        if offer_stls {
            chain.add_command_handler(Box::new(StlsCmdHandler))?;
        }

        chain.wire_extensible_handlers()?;
        let dispatcher = chain.dispatcher(reply::err("Internal error"))?;

        Ok(Pop3Pipeline {
            config: Arc::new(self.config),
            connect_handlers: chain.connect_handlers().to_vec(),
            dispatcher,
            tls_upgrader: self.tls_upgrader,
        })
    }
}

/// A wired POP3 protocol, ready to serve connections.
pub struct Pop3Pipeline {
    config: Arc<Pop3Config>,
    connect_handlers: Vec<Arc<dyn ConnectHandler<Pop3Session>>>,
    dispatcher: CommandDispatcher<Pop3Session>,
    tls_upgrader: Option<Arc<dyn TlsUpgrader>>,
}

impl ProtocolPipeline for Pop3Pipeline {
    type Session = Pop3Session;

    fn create_session(&self, info: ConnectionInfo) -> Pop3Session {
        Pop3Session::new(self.config.clone(), info)
    }

    fn dispatcher(&self) -> Box<dyn LineHandler<Pop3Session>> {
        Box::new(self.dispatcher.clone())
    }

    fn connect_handlers(&self) -> Vec<Arc<dyn ConnectHandler<Pop3Session>>> {
        self.connect_handlers.clone()
    }

    fn timeout_response(&self) -> Response {
        reply::err("Connection timed out").end_session()
    }

    fn line_too_long_response(&self) -> Response {
        reply::err("Line too long").end_session()
    }

    fn tls_upgrader(&self) -> Option<Arc<dyn TlsUpgrader>> {
        self.tls_upgrader.clone()
    }
}
