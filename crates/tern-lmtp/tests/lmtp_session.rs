//! Wire-level LMTP session test: per-recipient DATA replies.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tern_lmtp::{DeliverToRecipientHook, LmtpPipeline, LmtpPipelineBuilder};
use tern_proto::ConnectionInfo;
use tern_smtp::{
    codes, dsn::DsnStatus, ForwardPath, HookResult, HookReturnCode, SmtpConfig,
    SmtpSession,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::watch;

struct Client {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    _shutdown: watch::Sender<bool>,
}

impl Client {
    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
    }

    async fn line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    async fn reply(&mut self) -> Vec<String> {
        let mut lines = vec![];
        loop {
            let line = self.line().await;
            let continued = line.as_bytes().get(3) == Some(&b'-');
            lines.push(line);
            if !continued {
                return lines;
            }
        }
    }
}

fn start(pipeline: LmtpPipeline) -> Client {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let info = ConnectionInfo {
        local: "127.0.0.1:24".parse().unwrap(),
        peer: "127.0.0.1:40000".parse().unwrap(),
    };
    tokio::spawn(tern_server::serve(
        Box::new(server),
        info,
        Arc::new(pipeline),
        Duration::from_secs(60),
        shutdown_rx,
    ));
    let (read, writer) = tokio::io::split(client);
    Client {
        reader: BufReader::new(read),
        writer,
        _shutdown: shutdown_tx,
    }
}

/// Fails delivery for one unlucky mailbox, accepts everything else.
struct FlakyMaildrop;

#[async_trait]
impl DeliverToRecipientHook for FlakyMaildrop {
    async fn deliver(
        &self,
        _session: &mut SmtpSession,
        recipient: &ForwardPath,
        _message: &[u8],
    ) -> HookResult {
        if recipient.to_string() == "full@ex" {
            HookResult::with_response(
                HookReturnCode::DenySoft,
                codes::LOCAL_ERROR,
                DsnStatus::temporary(2, 2),
                "mailbox full",
            )
        } else {
            HookResult::ok()
        }
    }
}

#[tokio::test]
async fn lmtp_replies_once_per_recipient() {
    let pipeline = LmtpPipelineBuilder::new(SmtpConfig::default())
        .add_delivery_hook(Arc::new(FlakyMaildrop))
        .build()
        .unwrap();
    let mut client = start(pipeline);
    client.line().await;

    client.send("LHLO client.example").await;
    let lhlo = client.reply().await;
    assert!(lhlo[0].starts_with("250-localhost Hello client.example"));

    client.send("MAIL FROM:<a@ex>").await;
    assert_eq!(client.line().await, "250 2.1.0 Sender <a@ex> OK");
    client.send("RCPT TO:<b@ex>").await;
    assert_eq!(client.line().await, "250 2.1.5 Recipient <b@ex> OK");
    client.send("RCPT TO:<full@ex>").await;
    assert_eq!(client.line().await, "250 2.1.5 Recipient <full@ex> OK");

    client.send("DATA").await;
    assert_eq!(
        client.line().await,
        "354 Start mail input; end with <CRLF>.<CRLF>"
    );
    client.send("Subject: x").await;
    client.send("").await;
    client.send("hi").await;
    client.send(".").await;

    // exactly one reply block per recipient, in RCPT order
    assert_eq!(
        client.line().await,
        "250 2.1.5 OK <b@ex> message accepted"
    );
    assert_eq!(client.line().await, "451 4.2.2 mailbox full");

    // the transaction is reset; a second message can follow
    client.send("MAIL FROM:<a@ex>").await;
    assert_eq!(client.line().await, "250 2.1.0 Sender <a@ex> OK");
}

#[tokio::test]
async fn ehlo_is_refused_in_lmtp() {
    let pipeline = LmtpPipelineBuilder::new(SmtpConfig::default())
        .build()
        .unwrap();
    let mut client = start(pipeline);
    client.line().await;

    client.send("EHLO client.example").await;
    assert_eq!(
        client.line().await,
        "500 5.5.1 EHLO not supported, use LHLO"
    );

    client.send("LHLO client.example").await;
    let reply = client.reply().await;
    assert!(reply.last().unwrap().starts_with("250 "));
}
