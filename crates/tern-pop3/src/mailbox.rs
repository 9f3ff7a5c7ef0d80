use async_trait::async_trait;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Size of one message in the maildrop snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum MailboxError {
    /// Someone else holds the maildrop lock.
    #[error("maildrop already locked")]
    InUse,
    #[error("maildrop unavailable: {0}")]
    Unavailable(String),
}

pub type MessageStream = Pin<Box<dyn AsyncRead + Send>>;

/// An open, locked maildrop.
///
/// Indexes are 0-based positions into the snapshot taken when the mailbox
/// was opened; POP3 message numbers are index + 1. Deletions are marks
/// until `commit_deletes`; `rollback` forgets them, which is all a POP3
/// RSET needs.
#[async_trait]
pub trait Mailbox: Send {
    /// One entry per message, in maildrop order, deleted ones included.
    async fn list(&self) -> anyhow::Result<Vec<MessageInfo>>;

    /// Full content of message `index`.
    async fn retrieve(&self, index: usize) -> anyhow::Result<MessageStream>;

    /// Unique, stable identifier of message `index` (for UIDL).
    async fn uidl(&self, index: usize) -> anyhow::Result<String>;

    /// Total size of the maildrop in bytes.
    async fn total_size(&self) -> anyhow::Result<u64>;

    /// Mark message `index` for deletion.
    fn delete(&mut self, index: usize);

    /// Forget all deletion marks.
    fn rollback(&mut self);

    /// Apply the deletion marks and release the maildrop lock.
    async fn commit_deletes(&mut self) -> anyhow::Result<()>;
}

/// Yields a locked [`Mailbox`] for an authenticated user.
#[async_trait]
pub trait MailboxFactory: Send + Sync {
    async fn open(&self, user: &str) -> Result<Box<dyn Mailbox>, MailboxError>;
}
