use crate::config::Pop3Config;
use crate::mailbox::{Mailbox, MessageInfo};
use std::collections::BTreeSet;
use std::sync::Arc;
use tern_proto::{ConnectionInfo, Extensions, ProtocolSession, TransportHandle};

/// RFC 1939 session states. QUIT moves Transaction → Update, where the
/// deletion marks are applied; everything else ends the connection from
/// wherever it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop3State {
    Authorization,
    Transaction,
    Update,
}

/// Per-connection POP3 state.
///
/// The maildrop snapshot is taken when PASS opens the mailbox; message
/// numbers stay stable for the life of the session, deleted or not. POP3
/// RSET clears the deletion marks only; there is no carry-over set.
pub struct Pop3Session {
    transport: TransportHandle<Self>,
    config: Arc<Pop3Config>,
    state: Pop3State,
    username: Option<String>,
    mailbox: Option<Box<dyn Mailbox>>,
    messages: Vec<MessageInfo>,
    deleted: BTreeSet<usize>,
    extensions: Extensions,
}

impl Pop3Session {
    pub fn new(config: Arc<Pop3Config>, info: ConnectionInfo) -> Self {
        Self {
            transport: TransportHandle::new(info),
            config,
            state: Pop3State::Authorization,
            username: None,
            mailbox: None,
            messages: vec![],
            deleted: BTreeSet::new(),
            extensions: Extensions::default(),
        }
    }

    pub fn state(&self) -> Pop3State {
        self.state
    }

    pub fn set_state(&mut self, state: Pop3State) {
        self.state = state;
    }

    pub fn greeting(&self) -> String {
        self.config.greeting()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = Some(username.into());
    }

    /// Enter the Transaction state with an opened maildrop and its
    /// snapshot.
    pub fn attach_mailbox(&mut self, mailbox: Box<dyn Mailbox>, messages: Vec<MessageInfo>) {
        self.mailbox = Some(mailbox);
        self.messages = messages;
        self.deleted.clear();
        self.state = Pop3State::Transaction;
    }

    pub fn mailbox_mut(&mut self) -> Option<&mut Box<dyn Mailbox>> {
        self.mailbox.as_mut()
    }

    pub fn messages(&self) -> &[MessageInfo] {
        &self.messages
    }

    /// Look up a 1-based message number, refusing deleted entries.
    pub fn message(&self, number: usize) -> Option<&MessageInfo> {
        if number == 0 || self.deleted.contains(&(number - 1)) {
            return None;
        }
        self.messages.get(number - 1)
    }

    pub fn mark_deleted(&mut self, number: usize) {
        self.deleted.insert(number - 1);
    }

    pub fn is_deleted(&self, number: usize) -> bool {
        number > 0 && self.deleted.contains(&(number - 1))
    }

    pub fn deleted_indexes(&self) -> Vec<usize> {
        self.deleted.iter().copied().collect()
    }

    /// Undeleted message count and total size, for STAT and LIST.
    pub fn stat(&self) -> (usize, u64) {
        let mut count = 0;
        let mut size = 0;
        for (index, info) in self.messages.iter().enumerate() {
            if !self.deleted.contains(&index) {
                count += 1;
                size += info.size;
            }
        }
        (count, size)
    }

    /// POP3 transaction state is exactly the deletion marks; RSET clears
    /// them and nothing carries over.
    pub fn reset_state(&mut self) {
        self.deleted.clear();
    }

    pub fn extensions(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

impl ProtocolSession for Pop3Session {
    fn transport(&self) -> &TransportHandle<Self> {
        &self.transport
    }

    fn transport_mut(&mut self) -> &mut TransportHandle<Self> {
        &mut self.transport
    }
}
