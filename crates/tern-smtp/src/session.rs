use crate::config::SmtpConfig;
use crate::parser::{ForwardPath, ReversePath};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tern_proto::{ConnectionInfo, Extensions, ProtocolSession, TransportHandle};

/// How the client introduced itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeloMode {
    Helo,
    Ehlo,
    Lhlo,
}

impl fmt::Display for HeloMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo => write!(f, "HELO"),
            Self::Ehlo => write!(f, "EHLO"),
            Self::Lhlo => write!(f, "LHLO"),
        }
    }
}

/// Transaction-scoped state: everything `reset_state` clears.
///
/// The HELO mode lives here too but is the designated carry-over entry;
/// a reset snapshots it across the wipe. `pending_sender`/`pending_rcpt`
/// are parse scratch: the address a command is currently negotiating moves
/// into `sender`/`rcpt_list` only once its hook chain has accepted it, so a
/// denied command leaves no trace.
#[derive(Default)]
pub struct Transaction {
    helo_mode: Option<HeloMode>,
    helo_name: Option<String>,
    sender: Option<ReversePath>,
    rcpt_list: Vec<ForwardPath>,
    size_hint: Option<u64>,
    pending_sender: Option<ReversePath>,
    pending_rcpt: Option<ForwardPath>,
    extensions: Extensions,
}

/// Per-connection SMTP state and policy view.
///
/// Connection-scoped entries (authenticated identity, relay permission,
/// extension bag) survive `reset_state`; the [`Transaction`] does not,
/// except for the HELO mode carry-over.
pub struct SmtpSession {
    transport: TransportHandle<Self>,
    config: Arc<SmtpConfig>,
    lmtp: bool,
    relaying_allowed: bool,
    authenticated: Option<String>,
    connection_extensions: Extensions,
    tx: Transaction,
}

impl SmtpSession {
    pub fn new(config: Arc<SmtpConfig>, info: ConnectionInfo) -> Self {
        Self::build(config, info, false)
    }

    /// An LMTP session: identical state model, LHLO instead of HELO/EHLO
    /// and per-recipient DATA replies.
    pub fn new_lmtp(config: Arc<SmtpConfig>, info: ConnectionInfo) -> Self {
        Self::build(config, info, true)
    }

    fn build(config: Arc<SmtpConfig>, info: ConnectionInfo, lmtp: bool) -> Self {
        let relaying_allowed = config.relaying_allowed(info.peer.ip());
        Self {
            transport: TransportHandle::new(info),
            config,
            lmtp,
            relaying_allowed,
            authenticated: None,
            connection_extensions: Extensions::default(),
            tx: Transaction::default(),
        }
    }

    pub fn is_lmtp(&self) -> bool {
        self.lmtp
    }

    /// Clear the transaction, keeping only the carry-over set (the HELO
    /// mode). Idempotent.
    pub fn reset_state(&mut self) {
        let helo_mode = self.tx.helo_mode.take();
        self.tx = Transaction::default();
        self.tx.helo_mode = helo_mode;
    }

    // --- transaction state -------------------------------------------------

    pub fn helo_mode(&self) -> Option<HeloMode> {
        self.tx.helo_mode
    }

    pub fn set_helo_mode(&mut self, mode: HeloMode) {
        self.tx.helo_mode = Some(mode);
    }

    pub fn helo_name(&self) -> Option<&str> {
        self.tx.helo_name.as_deref()
    }

    pub fn set_helo_name(&mut self, name: impl Into<String>) {
        self.tx.helo_name = Some(name.into());
    }

    pub fn sender(&self) -> Option<&ReversePath> {
        self.tx.sender.as_ref()
    }

    pub fn rcpt_list(&self) -> &[ForwardPath] {
        &self.tx.rcpt_list
    }

    pub fn rcpt_count(&self) -> usize {
        self.tx.rcpt_list.len()
    }

    pub fn size_hint(&self) -> Option<u64> {
        self.tx.size_hint
    }

    pub fn set_size_hint(&mut self, size: u64) {
        self.tx.size_hint = Some(size);
    }

    pub fn transaction_extensions(&mut self) -> &mut Extensions {
        &mut self.tx.extensions
    }

    pub(crate) fn set_pending_sender(&mut self, sender: ReversePath) {
        self.tx.pending_sender = Some(sender);
    }

    pub(crate) fn pending_sender(&self) -> Option<&ReversePath> {
        self.tx.pending_sender.as_ref()
    }

    /// Promote the negotiated sender; called once the hook chain accepted
    /// the MAIL command.
    pub(crate) fn commit_sender(&mut self) -> Option<ReversePath> {
        let sender = self.tx.pending_sender.take()?;
        self.tx.sender = Some(sender.clone());
        Some(sender)
    }

    pub(crate) fn set_pending_rcpt(&mut self, rcpt: ForwardPath) {
        self.tx.pending_rcpt = Some(rcpt);
    }

    pub(crate) fn pending_rcpt(&self) -> Option<&ForwardPath> {
        self.tx.pending_rcpt.as_ref()
    }

    pub(crate) fn commit_rcpt(&mut self) -> Option<ForwardPath> {
        let rcpt = self.tx.pending_rcpt.take()?;
        self.tx.rcpt_list.push(rcpt.clone());
        Some(rcpt)
    }

    // --- connection state --------------------------------------------------

    pub fn authenticated(&self) -> Option<&str> {
        self.authenticated.as_deref()
    }

    /// Record a verified identity; authenticated peers may relay.
    pub fn set_authenticated(&mut self, identity: impl Into<String>) {
        self.authenticated = Some(identity.into());
        self.relaying_allowed = true;
    }

    pub fn connection_extensions(&mut self) -> &mut Extensions {
        &mut self.connection_extensions
    }

    // --- policy accessors --------------------------------------------------

    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    pub fn hello_name(&self) -> &str {
        &self.config.hello_name
    }

    pub fn greeting(&self) -> String {
        self.config.greeting()
    }

    pub fn max_message_size(&self) -> u64 {
        self.config.max_message_size
    }

    pub fn is_relaying_allowed(&self) -> bool {
        self.relaying_allowed
    }

    pub fn is_auth_required(&self) -> bool {
        self.config.auth_required(self.remote_ip())
    }

    pub fn use_address_brackets(&self) -> bool {
        self.config.enforce_address_brackets
    }

    pub fn use_helo_ehlo_enforcement(&self) -> bool {
        self.config.enforce_helo_ehlo
    }

    pub fn remote_ip(&self) -> IpAddr {
        self.remote_addr().ip()
    }
}

impl ProtocolSession for SmtpSession {
    fn transport(&self) -> &TransportHandle<Self> {
        &self.transport
    }

    fn transport_mut(&mut self) -> &mut TransportHandle<Self> {
        &mut self.transport
    }

    fn tls_started(&mut self) {
        // RFC 3207: the session returns to its initial state after the
        // handshake; nothing learned in the clear survives.
        self.tx = Transaction::default();
        self.connection_extensions.clear();
        self.authenticated = None;
        self.relaying_allowed = self.config.relaying_allowed(self.remote_ip());
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn session_with(config: SmtpConfig) -> SmtpSession {
        let info = ConnectionInfo {
            local: "127.0.0.1:25".parse().unwrap(),
            peer: "127.0.0.1:40000".parse().unwrap(),
        };
        SmtpSession::new(Arc::new(config), info)
    }

    pub fn session() -> SmtpSession {
        session_with(SmtpConfig::default())
    }
}
