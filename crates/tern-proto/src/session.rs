use crate::handler::LineHandler;
use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Addresses of an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub local: SocketAddr,
    pub peer: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsStatus {
    Off,
    Handshaking,
    On,
}

/// A pending mutation of the connection's line-handler stack, recorded by a
/// handler and applied by the transport before the next line is framed.
pub enum StackOp<S: Send> {
    Push(Box<dyn LineHandler<S>>),
    Pop,
}

/// The session's view of its connection.
///
/// Handlers never touch the socket directly; they record stack operations,
/// TLS upgrade requests and the close intent here, and the connection driver
/// applies them once the handler returns. The driver also parks the peer and
/// local addresses, the TLS status and the cancellation flag here so that
/// session code can read them without a back-reference to the connection.
pub struct TransportHandle<S: Send> {
    info: ConnectionInfo,
    tls: TlsStatus,
    ops: Vec<StackOp<S>>,
    start_tls: bool,
    cancelled: Arc<AtomicBool>,
}

impl<S: Send> TransportHandle<S> {
    pub fn new(info: ConnectionInfo) -> Self {
        Self {
            info,
            tls: TlsStatus::Off,
            ops: vec![],
            start_tls: false,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.info.peer
    }

    pub fn local(&self) -> SocketAddr {
        self.info.local
    }

    pub fn tls_status(&self) -> TlsStatus {
        self.tls
    }

    pub fn set_tls_status(&mut self, status: TlsStatus) {
        self.tls = status;
    }

    /// Schedule a line handler to be pushed on top of the stack.
    pub fn push_line_handler(&mut self, handler: Box<dyn LineHandler<S>>) {
        self.ops.push(StackOp::Push(handler));
    }

    /// Schedule the top line handler to be popped.
    pub fn pop_line_handler(&mut self) {
        self.ops.push(StackOp::Pop);
    }

    /// Ask the transport to upgrade the stream to TLS once the pending
    /// reply has been flushed.
    pub fn request_tls_upgrade(&mut self) {
        self.start_tls = true;
    }

    /// True once the server is shutting the connection down; long-running
    /// work should probe this before mutating session state.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn take_stack_ops(&mut self) -> Vec<StackOp<S>> {
        std::mem::take(&mut self.ops)
    }

    pub fn take_tls_request(&mut self) -> bool {
        std::mem::take(&mut self.start_tls)
    }
}

/// Implemented by each protocol's session type over the shared transport
/// plumbing. The provided methods are forwarders; protocols add their own
/// state and policy accessors on the concrete type.
pub trait ProtocolSession: Sized + Send + 'static {
    fn transport(&self) -> &TransportHandle<Self>;
    fn transport_mut(&mut self) -> &mut TransportHandle<Self>;

    /// Invoked by the transport once a TLS upgrade completes.
    fn tls_started(&mut self) {}

    fn push_line_handler(&mut self, handler: Box<dyn LineHandler<Self>>) {
        self.transport_mut().push_line_handler(handler);
    }

    fn pop_line_handler(&mut self) {
        self.transport_mut().pop_line_handler();
    }

    fn remote_addr(&self) -> SocketAddr {
        self.transport().peer()
    }

    fn local_addr(&self) -> SocketAddr {
        self.transport().local()
    }

    fn is_tls(&self) -> bool {
        self.transport().tls_status() == TlsStatus::On
    }

    fn is_cancelled(&self) -> bool {
        self.transport().is_cancelled()
    }
}

/// String-keyed state bag for third-party handlers.
///
/// Values are typed; a read with the wrong type, like a read of an absent
/// key, comes back as `None`.
#[derive(Default)]
pub struct Extensions {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: &'static str, value: T) {
        self.values.insert(key, Box::new(value));
    }

    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut())
    }

    pub fn remove<T: 'static>(&mut self, key: &str) -> Option<T> {
        let value = self.values.remove(key)?;
        value.downcast().ok().map(|boxed| *boxed)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_typed_access() {
        let mut ext = Extensions::default();
        ext.insert("counter", 7u32);
        assert_eq!(ext.get::<u32>("counter"), Some(&7));
        // wrong type reads as absent
        assert_eq!(ext.get::<String>("counter"), None);
        assert_eq!(ext.get::<u32>("missing"), None);
        assert_eq!(ext.remove::<u32>("counter"), Some(7));
        assert!(ext.is_empty());
    }
}
