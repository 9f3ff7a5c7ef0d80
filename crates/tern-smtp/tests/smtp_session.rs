//! Wire-level SMTP session tests, driven over an in-memory duplex.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tern_proto::ConnectionInfo;
use tern_smtp::{
    DnsError, DnsService, HookResult, MessageHook, SmtpConfig, SmtpPipeline,
    SmtpPipelineBuilder, SmtpSession,
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

    /// Read one full reply, following `250-` continuation lines.
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

    async fn expect_eof(&mut self) {
        let mut rest = String::new();
        self.reader.read_line(&mut rest).await.unwrap();
        assert!(rest.is_empty(), "expected EOF, got {rest:?}");
    }
}

fn start(pipeline: SmtpPipeline) -> Client {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let info = ConnectionInfo {
        local: "127.0.0.1:25".parse().unwrap(),
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

struct CaptureHook {
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[async_trait]
impl MessageHook for CaptureHook {
    async fn on_message(&self, _session: &mut SmtpSession, message: &[u8]) -> HookResult {
        self.messages.lock().unwrap().push(message.to_vec());
        HookResult::declined()
    }
}

#[tokio::test]
async fn smtp_happy_path() {
    let messages = Arc::new(Mutex::new(vec![]));
    let pipeline = SmtpPipelineBuilder::new(SmtpConfig::default())
        .add_message_hook(Arc::new(CaptureHook {
            messages: messages.clone(),
        }))
        .build()
        .unwrap();
    let mut client = start(pipeline);

    assert_eq!(client.line().await, "220 localhost ESMTP service ready");

    client.send("EHLO client.example").await;
    let ehlo = client.reply().await;
    assert!(ehlo[0].starts_with("250-localhost Hello client.example"));
    assert!(ehlo.iter().any(|l| l.contains("PIPELINING")));
    assert!(ehlo.last().unwrap().starts_with("250 "));

    client.send("MAIL FROM:<a@ex>").await;
    assert_eq!(client.line().await, "250 2.1.0 Sender <a@ex> OK");

    client.send("RCPT TO:<b@ex>").await;
    assert_eq!(client.line().await, "250 2.1.5 Recipient <b@ex> OK");

    client.send("DATA").await;
    assert_eq!(
        client.line().await,
        "354 Start mail input; end with <CRLF>.<CRLF>"
    );

    client.send("Subject: x").await;
    client.send("").await;
    client.send("hi").await;
    client.send(".").await;
    assert_eq!(client.line().await, "250 2.6.0 Message received");

    client.send("QUIT").await;
    assert_eq!(
        client.line().await,
        "221 2.0.0 localhost Service closing transmission channel"
    );
    client.expect_eof().await;

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0], b"Subject: x\r\n\r\nhi\r\n".to_vec());
}

#[tokio::test]
async fn mail_before_helo_is_rejected_without_side_effects() {
    let pipeline = SmtpPipelineBuilder::new(SmtpConfig::default())
        .build()
        .unwrap();
    let mut client = start(pipeline);
    client.line().await;

    client.send("MAIL FROM:<a@ex>").await;
    assert_eq!(
        client.line().await,
        "503 5.5.1 Need HELO or EHLO before MAIL"
    );

    // the session is untouched: a proper introduction still works
    client.send("EHLO client.example").await;
    client.reply().await;
    client.send("MAIL FROM:<a@ex>").await;
    assert_eq!(client.line().await, "250 2.1.0 Sender <a@ex> OK");
}

#[tokio::test]
async fn rset_preserves_the_helo_mode() {
    let pipeline = SmtpPipelineBuilder::new(SmtpConfig::default())
        .build()
        .unwrap();
    let mut client = start(pipeline);
    client.line().await;

    client.send("EHLO client.example").await;
    client.reply().await;
    client.send("MAIL FROM:<a@ex>").await;
    client.line().await;

    client.send("RSET").await;
    assert_eq!(client.line().await, "250 2.0.0 OK");

    // transaction cleared: DATA now complains about the missing sender
    client.send("DATA").await;
    assert_eq!(client.line().await, "503 5.5.1 No sender specified");

    // but the EHLO carried over: MAIL is accepted without re-greeting
    client.send("MAIL FROM:<a@ex>").await;
    assert_eq!(client.line().await, "250 2.1.0 Sender <a@ex> OK");
}

struct FixtureDns {
    zones: HashMap<String, Vec<String>>,
}

#[async_trait]
impl DnsService for FixtureDns {
    async fn find_mx_records(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        Ok(self.zones.get(domain).cloned().unwrap_or_default())
    }
}

#[tokio::test]
async fn sender_domain_mx_fast_fail() {
    let dns = Arc::new(FixtureDns {
        zones: HashMap::from([(
            "ok.example".to_string(),
            vec!["mx1.ok.example".to_string()],
        )]),
    });
    let pipeline = SmtpPipelineBuilder::new(SmtpConfig::default())
        .add_mail_hook(Arc::new(tern_smtp::fastfail::ValidSenderDomainHandler::new(
            dns,
        )))
        .build()
        .unwrap();
    let mut client = start(pipeline);
    client.line().await;

    client.send("EHLO client.example").await;
    client.reply().await;

    client.send("MAIL FROM:<x@nodomain.invalid>").await;
    assert_eq!(
        client.line().await,
        "501 5.1.7 sender <x@nodomain.invalid> contains a domain with no valid MX records"
    );

    // still in the post-HELO state: no stale sender blocks the next MAIL
    client.send("MAIL FROM:<a@ok.example>").await;
    assert_eq!(client.line().await, "250 2.1.0 Sender <a@ok.example> OK");
}

#[tokio::test]
async fn unknown_command_and_fault_tolerance() {
    let pipeline = SmtpPipelineBuilder::new(SmtpConfig::default())
        .build()
        .unwrap();
    let mut client = start(pipeline);
    client.line().await;

    client.send("FROBNICATE now").await;
    assert_eq!(
        client.line().await,
        "500 5.5.1 Unrecognized command FROBNICATE"
    );

    // the session survives the unknown verb
    client.send("NOOP").await;
    assert_eq!(client.line().await, "250 2.0.0 OK");
}
