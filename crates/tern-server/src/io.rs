use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Object-safe byte stream; boxing lets a TLS upgrade swap the underlying
/// stream without changing the connection's type.
pub trait AsyncReadAndWrite: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadAndWrite for T {}

pub type BoxedAsyncReadAndWrite = Box<dyn AsyncReadAndWrite>;

/// Performs the server side of a STARTTLS/STLS handshake.
///
/// The TLS implementation stays outside the core; an embedder supplies one
/// of these and the transport calls it after flushing the go-ahead reply and
/// discarding any bytes the peer pipelined behind the upgrade command.
#[async_trait]
pub trait TlsUpgrader: Send + Sync {
    async fn upgrade(
        &self,
        io: BoxedAsyncReadAndWrite,
    ) -> anyhow::Result<BoxedAsyncReadAndWrite>;
}
