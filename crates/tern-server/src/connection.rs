use crate::io::BoxedAsyncReadAndWrite;
use crate::pipeline::ProtocolPipeline;
use bytes::{Bytes, BytesMut};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tern_proto::{ProtocolSession, Response, StackOp, TlsStatus};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;

/// Drives one accepted connection to completion.
///
/// The driver owns the socket, the read buffer and the line-handler stack;
/// the protocol session records stack mutations and TLS upgrade requests on
/// its transport handle and the driver applies them between lines. All
/// commands on a connection are processed strictly in receive order.
pub struct Connection<P: ProtocolPipeline> {
    io: Option<BoxedAsyncReadAndWrite>,
    rdbuf: BytesMut,
    stack: Vec<Box<dyn tern_proto::LineHandler<P::Session>>>,
    session: P::Session,
    pipeline: Arc<P>,
    timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

enum NextLine {
    Line(Bytes),
    Eof,
    TimedOut,
    TooLong,
    Shutdown,
}

impl<P: ProtocolPipeline> Connection<P> {
    pub fn new(
        io: BoxedAsyncReadAndWrite,
        info: tern_proto::ConnectionInfo,
        pipeline: Arc<P>,
        timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let session = pipeline.create_session(info);
        let stack = vec![pipeline.dispatcher()];
        Self {
            io: Some(io),
            rdbuf: BytesMut::with_capacity(4 * 1024),
            stack,
            session,
            pipeline,
            timeout,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        for handler in self.pipeline.connect_handlers() {
            match handler.on_connect(&mut self.session).await {
                Ok(Some(response)) => {
                    let closing = self.send(&response).await?;
                    self.apply_stack_ops();
                    if closing {
                        return Ok(());
                    }
                }
                Ok(None) => self.apply_stack_ops(),
                Err(err) => {
                    tracing::error!("connect handler failed: {err:#}");
                    return Ok(());
                }
            }
        }

        loop {
            let line = match self.next_line().await? {
                NextLine::Line(line) => line,
                NextLine::Eof | NextLine::Shutdown => return Ok(()),
                NextLine::TimedOut => {
                    let response = self.pipeline.timeout_response();
                    let _ = self.send(&response).await;
                    return Ok(());
                }
                NextLine::TooLong => {
                    let response = self.pipeline.line_too_long_response();
                    let _ = self.send(&response).await;
                    return Ok(());
                }
            };

            let result = {
                let Self { stack, session, .. } = &mut self;
                let top = stack
                    .last_mut()
                    .expect("line handler stack is never empty while the connection is open");
                top.on_line(session, &line).await
            };

            match result {
                Ok(Some(response)) => {
                    self.apply_stack_ops();
                    if self.send(&response).await? {
                        return Ok(());
                    }
                }
                Ok(None) => self.apply_stack_ops(),
                Err(err) => {
                    tracing::error!("line handler failed: {err:#}");
                    return Ok(());
                }
            }

            if self.session.transport_mut().take_tls_request() {
                if self.upgrade_tls().await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    async fn next_line(&mut self) -> anyhow::Result<NextLine> {
        loop {
            if let Some(pos) = memchr::memchr(b'\n', &self.rdbuf) {
                let mut line = self.rdbuf.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                if let Some(max) = self.line_limit() {
                    if line.len() > max {
                        return Ok(NextLine::TooLong);
                    }
                }
                return Ok(NextLine::Line(line.freeze()));
            }
            if let Some(max) = self.line_limit() {
                if self.rdbuf.len() > max {
                    return Ok(NextLine::TooLong);
                }
            }

            let io = self.io.as_mut().expect("io is present outside of a TLS upgrade");
            tokio::select! {
                _ = self.shutdown.changed() => {
                    self.session
                        .transport()
                        .cancel_flag()
                        .store(true, Ordering::Relaxed);
                    return Ok(NextLine::Shutdown);
                }
                read = tokio::time::timeout(self.timeout, io.read_buf(&mut self.rdbuf)) => {
                    match read {
                        Err(_elapsed) => return Ok(NextLine::TimedOut),
                        Ok(Ok(0)) => return Ok(NextLine::Eof),
                        Ok(Ok(_)) => continue,
                        Ok(Err(err)) => return Err(err.into()),
                    }
                }
            }
        }
    }

    fn line_limit(&self) -> Option<usize> {
        self.stack
            .last()
            .expect("line handler stack is never empty while the connection is open")
            .max_line_length()
    }

    /// Write and flush one reply. Returns true when the session ends here.
    async fn send(&mut self, response: &Response) -> anyhow::Result<bool> {
        let mut out = Vec::with_capacity(64);
        for line in response.lines() {
            tracing::trace!("< {line}");
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        let io = self.io.as_mut().expect("io is present outside of a TLS upgrade");
        io.write_all(&out).await?;
        io.flush().await?;
        Ok(response.is_end_session())
    }

    fn apply_stack_ops(&mut self) {
        for op in self.session.transport_mut().take_stack_ops() {
            match op {
                StackOp::Push(handler) => self.stack.push(handler),
                StackOp::Pop => {
                    if self.stack.len() <= 1 {
                        panic!("line handler stack underflow: attempted to pop the command dispatcher");
                    }
                    self.stack.pop();
                }
            }
        }
    }

    async fn upgrade_tls(&mut self) -> anyhow::Result<()> {
        let Some(upgrader) = self.pipeline.tls_upgrader() else {
            tracing::error!("TLS upgrade requested but no upgrader is configured");
            anyhow::bail!("no TLS upgrader configured");
        };
        // RFC 3207: anything the peer pipelined behind the upgrade command
        // must not survive into the TLS session.
        self.rdbuf.clear();
        self.session
            .transport_mut()
            .set_tls_status(TlsStatus::Handshaking);

        let io = self.io.take().expect("io is present outside of a TLS upgrade");
        match upgrader.upgrade(io).await {
            Ok(new_io) => {
                self.io = Some(new_io);
                self.session.transport_mut().set_tls_status(TlsStatus::On);
                self.session.tls_started();
                Ok(())
            }
            Err(err) => {
                tracing::error!("TLS handshake failed: {err:#}");
                Err(err)
            }
        }
    }
}

/// Serve one already-accepted stream. Public so that embedders and tests can
/// drive a pipeline over arbitrary byte streams (e.g. an in-memory duplex).
pub async fn serve<P: ProtocolPipeline>(
    io: BoxedAsyncReadAndWrite,
    info: tern_proto::ConnectionInfo,
    pipeline: Arc<P>,
    timeout: Duration,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    Connection::new(io, info, pipeline, timeout, shutdown).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::TlsUpgrader;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tern_proto::{
        ConnectionInfo, LineHandler, ProtocolSession, TransportHandle,
    };
    use tokio::io::{AsyncBufReadExt, BufReader};

    struct EchoSession {
        transport: TransportHandle<Self>,
    }

    impl ProtocolSession for EchoSession {
        fn transport(&self) -> &TransportHandle<Self> {
            &self.transport
        }

        fn transport_mut(&mut self) -> &mut TransportHandle<Self> {
            &mut self.transport
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl LineHandler<EchoSession> for EchoHandler {
        async fn on_line(
            &mut self,
            session: &mut EchoSession,
            line: &[u8],
        ) -> anyhow::Result<Option<Response>> {
            let line = String::from_utf8_lossy(line).to_string();
            Ok(Some(match line.as_str() {
                "QUIT" => Response::with_line("221", "221 bye").end_session(),
                "PUSH" => {
                    session.push_line_handler(Box::new(ModalHandler));
                    Response::with_line("250", "250 pushed")
                }
                "TLS" => {
                    session.transport_mut().request_tls_upgrade();
                    Response::with_line("220", "220 go ahead")
                }
                "BADPOP" => {
                    session.pop_line_handler();
                    Response::with_line("250", "250 never sent")
                }
                other => Response::with_line("250", format!("250 echo {other}")),
            }))
        }
    }

    struct ModalHandler;

    #[async_trait]
    impl LineHandler<EchoSession> for ModalHandler {
        async fn on_line(
            &mut self,
            session: &mut EchoSession,
            line: &[u8],
        ) -> anyhow::Result<Option<Response>> {
            session.pop_line_handler();
            Ok(Some(Response::with_line(
                "250",
                format!("250 modal {}", String::from_utf8_lossy(line)),
            )))
        }
    }

    struct Passthrough;

    #[async_trait]
    impl TlsUpgrader for Passthrough {
        async fn upgrade(
            &self,
            io: BoxedAsyncReadAndWrite,
        ) -> anyhow::Result<BoxedAsyncReadAndWrite> {
            Ok(io)
        }
    }

    struct EchoPipeline {
        upgrader: Option<Arc<dyn TlsUpgrader>>,
    }

    impl ProtocolPipeline for EchoPipeline {
        type Session = EchoSession;

        fn create_session(&self, info: ConnectionInfo) -> EchoSession {
            EchoSession {
                transport: TransportHandle::new(info),
            }
        }

        fn dispatcher(&self) -> Box<dyn LineHandler<EchoSession>> {
            Box::new(EchoHandler)
        }

        fn connect_handlers(
            &self,
        ) -> Vec<Arc<dyn tern_proto::ConnectHandler<EchoSession>>> {
            vec![]
        }

        fn timeout_response(&self) -> Response {
            Response::with_line("421", "421 timeout").end_session()
        }

        fn line_too_long_response(&self) -> Response {
            Response::with_line("500", "500 line too long").end_session()
        }

        fn tls_upgrader(&self) -> Option<Arc<dyn TlsUpgrader>> {
            self.upgrader.clone()
        }
    }

    fn test_info() -> ConnectionInfo {
        let addr = "127.0.0.1:0".parse().unwrap();
        ConnectionInfo {
            local: addr,
            peer: addr,
        }
    }

    fn start(
        pipeline: EchoPipeline,
        timeout: Duration,
    ) -> (
        tokio::io::DuplexStream,
        tokio::task::JoinHandle<anyhow::Result<()>>,
        watch::Sender<bool>,
    ) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(serve(
            Box::new(server),
            test_info(),
            Arc::new(pipeline),
            timeout,
            shutdown_rx,
        ));
        (client, task, shutdown_tx)
    }

    async fn read_line(reader: &mut BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    #[tokio::test]
    async fn echo_and_quit() {
        let (client, task, _shutdown) = start(EchoPipeline { upgrader: None }, Duration::from_secs(60));
        let (read, mut write) = tokio::io::split(client);
        let mut reader = BufReader::new(read);

        write.write_all(b"hello\r\nQUIT\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "250 echo hello");
        assert_eq!(read_line(&mut reader).await, "221 bye");

        // connection closed after the end-session reply
        let mut rest = String::new();
        reader.read_line(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn balanced_push_pop_restores_the_stack() {
        let (client, _task, _shutdown) = start(EchoPipeline { upgrader: None }, Duration::from_secs(60));
        let (read, mut write) = tokio::io::split(client);
        let mut reader = BufReader::new(read);

        write
            .write_all(b"PUSH\r\nanything\r\nafter\r\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut reader).await, "250 pushed");
        assert_eq!(read_line(&mut reader).await, "250 modal anything");
        // the modal handler popped itself; the bottom handler is back
        assert_eq!(read_line(&mut reader).await, "250 echo after");
    }

    #[tokio::test]
    #[should_panic(expected = "line handler stack underflow")]
    async fn pop_underflow_panics() {
        let (client, server) = tokio::io::duplex(1024);
        let (mut read, mut write) = tokio::io::split(client);
        write.write_all(b"BADPOP\r\n").await.unwrap();
        drop(write);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            let mut sink = vec![0u8; 1024];
            let _ = read.read(&mut sink).await;
        });
        serve(
            Box::new(server),
            test_info(),
            Arc::new(EchoPipeline { upgrader: None }),
            Duration::from_secs(60),
            shutdown_rx,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn overlong_line_is_rejected() {
        let (client, _task, _shutdown) = start(EchoPipeline { upgrader: None }, Duration::from_secs(60));
        let (read, mut write) = tokio::io::split(client);
        let mut reader = BufReader::new(read);

        let big = vec![b'a'; tern_proto::DEFAULT_MAX_LINE_LENGTH + 2];
        write.write_all(&big).await.unwrap();
        assert_eq!(read_line(&mut reader).await, "500 line too long");
        let mut rest = String::new();
        reader.read_line(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_sends_protocol_reply() {
        let (client, _task, _shutdown) =
            start(EchoPipeline { upgrader: None }, Duration::from_secs(5));
        let (read, _write) = tokio::io::split(client);
        let mut reader = BufReader::new(read);

        // no traffic at all; paused time auto-advances past the deadline
        assert_eq!(read_line(&mut reader).await, "421 timeout");
        let mut rest = String::new();
        reader.read_line(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn tls_upgrade_discards_pipelined_bytes() {
        let (client, _task, _shutdown) = start(
            EchoPipeline {
                upgrader: Some(Arc::new(Passthrough)),
            },
            Duration::from_secs(60),
        );
        let (read, mut write) = tokio::io::split(client);
        let mut reader = BufReader::new(read);

        // the injected command rides in the same packet as the upgrade
        write.write_all(b"TLS\r\nINJECTED\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "220 go ahead");

        write.write_all(b"after\r\nQUIT\r\n").await.unwrap();
        // INJECTED never produced a reply
        assert_eq!(read_line(&mut reader).await, "250 echo after");
        assert_eq!(read_line(&mut reader).await, "221 bye");
    }

    #[tokio::test]
    async fn shutdown_signal_closes_the_connection() {
        let (client, task, shutdown) = start(EchoPipeline { upgrader: None }, Duration::from_secs(60));
        let (read, mut write) = tokio::io::split(client);
        let mut reader = BufReader::new(read);

        write.write_all(b"hello\r\n").await.unwrap();
        assert_eq!(read_line(&mut reader).await, "250 echo hello");

        shutdown.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
