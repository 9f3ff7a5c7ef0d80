//! Asynchronous TCP transport for line-oriented mail protocol servers.
//!
//! [`AsyncServer`] owns the listening sockets and a dedicated IO worker
//! runtime; each accepted socket is driven by a [`connection::Connection`]
//! that frames CRLF lines, feeds them to the protocol's line-handler stack
//! and writes the replies back. Protocols plug in through
//! [`ProtocolPipeline`].

pub mod connection;
pub mod io;
pub mod pipeline;

pub use connection::{serve, Connection};
pub use io::{AsyncReadAndWrite, BoxedAsyncReadAndWrite, TlsUpgrader};
pub use pipeline::ProtocolPipeline;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tern_proto::ConnectionInfo;
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("can only be changed while the server is not bound")]
    AlreadyBound,
    #[error("no listen address configured")]
    NoAddresses,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Non-blocking TCP acceptor for one protocol pipeline.
///
/// Configuration setters are rejected once the server is bound. `bind`
/// spins up a dedicated multi-threaded IO runtime sized by the worker
/// count; `unbind` signals every live connection to stop, then releases
/// the runtime. Both follow the classic async-server contract: bind fails
/// when already bound or when no address was given, unbind is idempotent.
pub struct AsyncServer<P: ProtocolPipeline> {
    pipeline: Arc<P>,
    addresses: Vec<SocketAddr>,
    backlog: u32,
    timeout: Duration,
    io_worker_count: usize,
    bound: Option<BoundState>,
}

struct BoundState {
    runtime: tokio::runtime::Runtime,
    shutdown_tx: watch::Sender<bool>,
    local_addrs: Vec<SocketAddr>,
}

pub const DEFAULT_BACKLOG: u32 = 250;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub fn default_io_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}

impl<P: ProtocolPipeline> AsyncServer<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            addresses: vec![],
            backlog: DEFAULT_BACKLOG,
            timeout: DEFAULT_TIMEOUT,
            io_worker_count: default_io_worker_count(),
            bound: None,
        }
    }

    pub fn set_listen_addresses(
        &mut self,
        addresses: Vec<SocketAddr>,
    ) -> Result<(), ServerError> {
        self.ensure_unbound()?;
        self.addresses = addresses;
        Ok(())
    }

    pub fn set_io_worker_count(&mut self, count: usize) -> Result<(), ServerError> {
        self.ensure_unbound()?;
        self.io_worker_count = count.max(1);
        Ok(())
    }

    /// Per-connection idle timeout in seconds.
    pub fn set_timeout(&mut self, seconds: u64) -> Result<(), ServerError> {
        self.ensure_unbound()?;
        self.timeout = Duration::from_secs(seconds);
        Ok(())
    }

    pub fn set_backlog(&mut self, backlog: u32) -> Result<(), ServerError> {
        self.ensure_unbound()?;
        self.backlog = backlog;
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// The addresses actually bound, with ephemeral ports resolved.
    pub fn local_addresses(&self) -> &[SocketAddr] {
        self.bound
            .as_ref()
            .map(|b| b.local_addrs.as_slice())
            .unwrap_or_default()
    }

    pub fn bind(&mut self) -> Result<(), ServerError> {
        if self.bound.is_some() {
            return Err(ServerError::AlreadyBound);
        }
        if self.addresses.is_empty() {
            return Err(ServerError::NoAddresses);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.io_worker_count)
            .enable_all()
            .thread_name("tern-io")
            .build()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut local_addrs = vec![];
        {
            // listener registration needs the IO runtime's reactor
            let _guard = runtime.enter();
            for addr in &self.addresses {
                let socket = match addr {
                    SocketAddr::V4(_) => TcpSocket::new_v4()?,
                    SocketAddr::V6(_) => TcpSocket::new_v6()?,
                };
                socket.set_reuseaddr(true)?;
                socket.bind(*addr)?;
                let listener = socket.listen(self.backlog)?;
                local_addrs.push(listener.local_addr()?);
                runtime.spawn(accept_loop(
                    listener,
                    self.pipeline.clone(),
                    self.timeout,
                    shutdown_rx.clone(),
                ));
            }
        }

        self.bound = Some(BoundState {
            runtime,
            shutdown_tx,
            local_addrs,
        });
        Ok(())
    }

    /// Stop accepting, close all live connections, release the IO runtime.
    pub fn unbind(&mut self) {
        if let Some(bound) = self.bound.take() {
            let _ = bound.shutdown_tx.send(true);
            bound.runtime.shutdown_background();
        }
    }

    fn ensure_unbound(&self) -> Result<(), ServerError> {
        if self.bound.is_some() {
            Err(ServerError::AlreadyBound)
        } else {
            Ok(())
        }
    }
}

impl<P: ProtocolPipeline> Drop for AsyncServer<P> {
    fn drop(&mut self) {
        self.unbind();
    }
}

async fn accept_loop<P: ProtocolPipeline>(
    listener: TcpListener,
    pipeline: Arc<P>,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let local = listener.local_addr().ok();
    tracing::info!("listening on {local:?}");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        if let Err(err) = stream.set_nodelay(true) {
                            tracing::debug!("set_nodelay failed for {peer}: {err}");
                        }
                        let local_addr = stream
                            .local_addr()
                            .ok()
                            .or(local)
                            .unwrap_or_else(|| "0.0.0.0:0".parse().unwrap());
                        let info = ConnectionInfo {
                            local: local_addr,
                            peer,
                        };
                        let pipeline = pipeline.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            tracing::debug!("connection from {peer}");
                            let result = connection::serve(
                                Box::new(stream),
                                info,
                                pipeline,
                                timeout,
                                shutdown,
                            )
                            .await;
                            if let Err(err) = result {
                                tracing::error!("({peer}) {err:#}");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::error!("accept failed: {err:#}");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}
