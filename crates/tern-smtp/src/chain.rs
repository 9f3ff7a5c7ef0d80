//! Default SMTP handler chain and pipeline assembly.

use crate::codes;
use crate::config::SmtpConfig;
use crate::core::{
    AuthBackendHook, AuthCmdHandler, AuthRequiredToRelayRcptHook, DataCmdHandler,
    EhloCmdHandler, HeloCmdHandler, MailCmdHandler, NoopCmdHandler, QuitCmdHandler,
    RcptCmdHandler, RsetCmdHandler, StartTlsCmdHandler, UnknownCmdHandler,
    VrfyCmdHandler, WelcomeMessageHandler,
};
use crate::dsn::DsnStatus;
use crate::hook::{AuthHook, HeloHook, MailHook, MessageHook, QuitHook, RcptHook};
use crate::reply;
use crate::session::SmtpSession;
use std::sync::Arc;
use tern_proto::{
    AuthBackend, CommandDispatcher, ConnectHandler, ConnectionInfo, LineHandler,
    ProtocolHandlerChain, Response, WiringError,
};
use tern_server::{ProtocolPipeline, TlsUpgrader};

/// Assembles the default SMTP chain: greeting, the core command handlers,
/// the built-in policy hooks and whatever extension hooks the embedder adds.
/// `build` wires the chain and yields a pipeline ready for `tern-server`.
pub struct SmtpPipelineBuilder {
    config: SmtpConfig,
    auth_backend: Option<Arc<dyn AuthBackend>>,
    tls_upgrader: Option<Arc<dyn TlsUpgrader>>,
    helo_hooks: Vec<Arc<dyn HeloHook>>,
    mail_hooks: Vec<Arc<dyn MailHook>>,
    rcpt_hooks: Vec<Arc<dyn RcptHook>>,
    message_hooks: Vec<Arc<dyn MessageHook>>,
    auth_hooks: Vec<Arc<dyn AuthHook>>,
    quit_hooks: Vec<Arc<dyn QuitHook>>,
}

impl SmtpPipelineBuilder {
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            config,
            auth_backend: None,
            tls_upgrader: None,
            helo_hooks: vec![],
            mail_hooks: vec![],
            rcpt_hooks: vec![],
            message_hooks: vec![],
            auth_hooks: vec![],
            quit_hooks: vec![],
        }
    }

    /// Offer AUTH PLAIN backed by this credential store.
    pub fn with_auth_backend(mut self, backend: Arc<dyn AuthBackend>) -> Self {
        self.auth_backend = Some(backend);
        self
    }

    /// Offer STARTTLS through this upgrader.
    pub fn with_tls_upgrader(mut self, upgrader: Arc<dyn TlsUpgrader>) -> Self {
        self.tls_upgrader = Some(upgrader);
        self
    }

    pub fn add_helo_hook(mut self, hook: Arc<dyn HeloHook>) -> Self {
        self.helo_hooks.push(hook);
        self
    }

    pub fn add_mail_hook(mut self, hook: Arc<dyn MailHook>) -> Self {
        self.mail_hooks.push(hook);
        self
    }

    pub fn add_rcpt_hook(mut self, hook: Arc<dyn RcptHook>) -> Self {
        self.rcpt_hooks.push(hook);
        self
    }

    pub fn add_message_hook(mut self, hook: Arc<dyn MessageHook>) -> Self {
        self.message_hooks.push(hook);
        self
    }

    pub fn add_auth_hook(mut self, hook: Arc<dyn AuthHook>) -> Self {
        self.auth_hooks.push(hook);
        self
    }

    pub fn add_quit_hook(mut self, hook: Arc<dyn QuitHook>) -> Self {
        self.quit_hooks.push(hook);
        self
    }

    pub fn build(self) -> Result<SmtpPipeline, WiringError> {
        let offer_auth = self.auth_backend.is_some();
        let offer_starttls = self.tls_upgrader.is_some();

        let mut chain = ProtocolHandlerChain::new();
        chain.add_connect_handler(Arc::new(WelcomeMessageHandler))?;

        chain.add_command_handler(Box::new(HeloCmdHandler::new()))?;
        chain.add_command_handler(Box::new(EhloCmdHandler::new(
            offer_starttls,
            offer_auth,
        )))?;
        chain.add_command_handler(Box::new(MailCmdHandler::new()))?;
        chain.add_command_handler(Box::new(RcptCmdHandler::new()))?;
        chain.add_command_handler(Box::new(DataCmdHandler::new()))?;
        chain.add_command_handler(Box::new(RsetCmdHandler))?;
        chain.add_command_handler(Box::new(NoopCmdHandler))?;
        chain.add_command_handler(Box::new(VrfyCmdHandler))?;
        chain.add_command_handler(Box::new(QuitCmdHandler::new()))?;
        chain.add_command_handler(Box::new(UnknownCmdHandler))?;
        if offer_starttls {
            chain.add_command_handler(Box::new(StartTlsCmdHandler))?;
        }
        if let Some(backend) = &self.auth_backend {
            chain.add_command_handler(Box::new(AuthCmdHandler::new()))?;
            chain.add_hook::<dyn AuthHook>(Arc::new(AuthBackendHook::new(
                backend.clone(),
            )))?;
        }

        // built-in policy precedes embedder hooks
        chain.add_hook::<dyn RcptHook>(Arc::new(AuthRequiredToRelayRcptHook::new(
            offer_auth,
        )))?;
        for hook in self.helo_hooks {
            chain.add_hook::<dyn HeloHook>(hook)?;
        }
        for hook in self.mail_hooks {
            chain.add_hook::<dyn MailHook>(hook)?;
        }
        for hook in self.rcpt_hooks {
            chain.add_hook::<dyn RcptHook>(hook)?;
        }
        for hook in self.message_hooks {
            chain.add_hook::<dyn MessageHook>(hook)?;
        }
        for hook in self.auth_hooks {
            chain.add_hook::<dyn AuthHook>(hook)?;
        }
        for hook in self.quit_hooks {
            chain.add_hook::<dyn QuitHook>(hook)?;
        }

        chain.wire_extensible_handlers()?;
        let dispatcher = chain.dispatcher(fault_response())?;

        Ok(SmtpPipeline {
            config: Arc::new(self.config),
            connect_handlers: chain.connect_handlers().to_vec(),
            dispatcher,
            tls_upgrader: self.tls_upgrader,
        })
    }
}

pub(crate) fn fault_response() -> Response {
    reply::single(
        codes::LOCAL_ERROR,
        Some(DsnStatus::temporary(3, 0)),
        "Requested action aborted: local error in processing",
    )
}

/// A wired SMTP protocol, ready to serve connections.
pub struct SmtpPipeline {
    config: Arc<SmtpConfig>,
    connect_handlers: Vec<Arc<dyn ConnectHandler<SmtpSession>>>,
    dispatcher: CommandDispatcher<SmtpSession>,
    tls_upgrader: Option<Arc<dyn TlsUpgrader>>,
}

impl SmtpPipeline {
    pub fn config(&self) -> &Arc<SmtpConfig> {
        &self.config
    }
}

impl ProtocolPipeline for SmtpPipeline {
    type Session = SmtpSession;

    fn create_session(&self, info: ConnectionInfo) -> SmtpSession {
        SmtpSession::new(self.config.clone(), info)
    }

    fn dispatcher(&self) -> Box<dyn LineHandler<SmtpSession>> {
        Box::new(self.dispatcher.clone())
    }

    fn connect_handlers(&self) -> Vec<Arc<dyn ConnectHandler<SmtpSession>>> {
        self.connect_handlers.clone()
    }

    fn timeout_response(&self) -> Response {
        reply::single(
            codes::SERVICE_NOT_AVAILABLE,
            Some(DsnStatus::temporary(4, 2)),
            format!("{} connection timed out", self.config.hello_name),
        )
        .end_session()
    }

    fn line_too_long_response(&self) -> Response {
        reply::single(
            codes::UNRECOGNIZED_COMMAND,
            Some(DsnStatus::permanent(5, 6)),
            "Line length exceeded",
        )
        .end_session()
    }

    fn tls_upgrader(&self) -> Option<Arc<dyn TlsUpgrader>> {
        self.tls_upgrader.clone()
    }
}
