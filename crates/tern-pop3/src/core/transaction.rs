use crate::core::require_state;
use crate::reply;
use crate::session::{Pop3Session, Pop3State};
use async_trait::async_trait;
use tern_proto::{CommandHandler, Response};
use tokio::io::AsyncReadExt;

fn parse_message_number(args: Option<&str>) -> Option<usize> {
    args?.trim().parse().ok().filter(|&n| n > 0)
}

async fn read_message(session: &mut Pop3Session, number: usize) -> anyhow::Result<Vec<u8>> {
    let mailbox = session
        .mailbox_mut()
        .ok_or_else(|| anyhow::anyhow!("no mailbox attached"))?;
    let mut stream = mailbox.retrieve(number - 1).await?;
    let mut data = vec![];
    stream.read_to_end(&mut data).await?;
    Ok(data)
}

/// STAT: undeleted message count and total size.
pub struct StatCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for StatCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["STAT"]
    }

    async fn on_command(
        &self,
        session: &mut Pop3Session,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = require_state(session, Pop3State::Transaction) {
            return Ok(response);
        }
        let (count, size) = session.stat();
        Ok(reply::ok(format!("{count} {size}")))
    }
}

/// LIST: scan listing, single message or the whole maildrop.
pub struct ListCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for ListCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["LIST"]
    }

    async fn on_command(
        &self,
        session: &mut Pop3Session,
        _verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = require_state(session, Pop3State::Transaction) {
            return Ok(response);
        }
        match args.map(str::trim).filter(|a| !a.is_empty()) {
            Some(_) => {
                let Some(number) = parse_message_number(args) else {
                    return Ok(reply::err("Usage: LIST [msg]"));
                };
                match session.message(number) {
                    Some(info) => Ok(reply::ok(format!("{number} {}", info.size))),
                    None => Ok(reply::err(format!("no such message {number}"))),
                }
            }
            None => {
                let (count, size) = session.stat();
                let listing: Vec<String> = session
                    .messages()
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| !session.is_deleted(index + 1))
                    .map(|(index, info)| format!("{} {}", index + 1, info.size))
                    .collect();
                Ok(reply::ok_multiline(
                    format!("{count} messages ({size} octets)"),
                    listing,
                ))
            }
        }
    }
}

/// UIDL: unique-id listing, single message or the whole maildrop.
pub struct UidlCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for UidlCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["UIDL"]
    }

    async fn on_command(
        &self,
        session: &mut Pop3Session,
        _verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = require_state(session, Pop3State::Transaction) {
            return Ok(response);
        }
        match args.map(str::trim).filter(|a| !a.is_empty()) {
            Some(_) => {
                let Some(number) = parse_message_number(args) else {
                    return Ok(reply::err("Usage: UIDL [msg]"));
                };
                if session.message(number).is_none() {
                    return Ok(reply::err(format!("no such message {number}")));
                }
                let uid = session
                    .mailbox_mut()
                    .ok_or_else(|| anyhow::anyhow!("no mailbox attached"))?
                    .uidl(number - 1)
                    .await?;
                Ok(reply::ok(format!("{number} {uid}")))
            }
            None => {
                let numbers: Vec<usize> = (1..=session.messages().len())
                    .filter(|&n| !session.is_deleted(n))
                    .collect();
                let mut listing = vec![];
                for number in numbers {
                    let uid = session
                        .mailbox_mut()
                        .ok_or_else(|| anyhow::anyhow!("no mailbox attached"))?
                        .uidl(number - 1)
                        .await?;
                    listing.push(format!("{number} {uid}"));
                }
                Ok(reply::ok_multiline("unique-id listing follows", listing))
            }
        }
    }
}

/// RETR: stream one message back, dot-stuffed.
pub struct RetrCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for RetrCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["RETR"]
    }

    async fn on_command(
        &self,
        session: &mut Pop3Session,
        _verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = require_state(session, Pop3State::Transaction) {
            return Ok(response);
        }
        let Some(number) = parse_message_number(args) else {
            return Ok(reply::err("Usage: RETR msg"));
        };
        let Some(info) = session.message(number).copied() else {
            return Ok(reply::err(format!("no such message {number}")));
        };
        let data = read_message(session, number).await?;
        Ok(reply::ok_with_data(format!("{} octets", info.size), &data))
    }
}

/// TOP: headers plus the first n body lines.
pub struct TopCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for TopCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["TOP"]
    }

    async fn on_command(
        &self,
        session: &mut Pop3Session,
        _verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = require_state(session, Pop3State::Transaction) {
            return Ok(response);
        }
        let parsed = args.and_then(|a| {
            let mut parts = a.split_whitespace();
            let number: usize = parts.next()?.parse().ok()?;
            let lines: usize = parts.next()?.parse().ok()?;
            Some((number, lines))
        });
        let Some((number, body_lines)) = parsed else {
            return Ok(reply::err("Usage: TOP msg n"));
        };
        if session.message(number).is_none() {
            return Ok(reply::err(format!("no such message {number}")));
        }

        let data = read_message(session, number).await?;
        let text = String::from_utf8_lossy(&data);
        let mut selected = vec![];
        let mut in_body = false;
        let mut body_seen = 0;
        for line in text.split("\r\n") {
            if in_body {
                if body_seen == body_lines {
                    break;
                }
                body_seen += 1;
            } else if line.is_empty() {
                in_body = true;
            }
            selected.push(line.to_string());
        }
        // drop a trailing empty fragment from a final CRLF
        if selected.last().is_some_and(|l| l.is_empty()) && !in_body {
            selected.pop();
        }
        Ok(reply::ok_multiline("top of message follows", selected))
    }
}

/// DELE: mark one message for deletion at QUIT.
pub struct DeleCmdHandler;

#[async_trait]
impl CommandHandler<Pop3Session> for DeleCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["DELE"]
    }

    async fn on_command(
        &self,
        session: &mut Pop3Session,
        _verb: &str,
        args: Option<&str>,
    ) -> anyhow::Result<Response> {
        if let Some(response) = require_state(session, Pop3State::Transaction) {
            return Ok(response);
        }
        let Some(number) = parse_message_number(args) else {
            return Ok(reply::err("Usage: DELE msg"));
        };
        if session.is_deleted(number) {
            return Ok(reply::err(format!("message {number} already deleted")));
        }
        if session.message(number).is_none() {
            return Ok(reply::err(format!("no such message {number}")));
        }
        session.mark_deleted(number);
        if let Some(mailbox) = session.mailbox_mut() {
            mailbox.delete(number - 1);
        }
        Ok(reply::ok(format!("message {number} deleted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{Mailbox, MessageInfo, MessageStream};
    use crate::session::test_support::session;

    struct VecMailbox {
        messages: Vec<Vec<u8>>,
    }

    #[async_trait]
    impl Mailbox for VecMailbox {
        async fn list(&self) -> anyhow::Result<Vec<MessageInfo>> {
            Ok(self
                .messages
                .iter()
                .map(|m| MessageInfo { size: m.len() as u64 })
                .collect())
        }

        async fn retrieve(&self, index: usize) -> anyhow::Result<MessageStream> {
            let data = self
                .messages
                .get(index)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such message"))?;
            Ok(Box::pin(std::io::Cursor::new(data)))
        }

        async fn uidl(&self, index: usize) -> anyhow::Result<String> {
            Ok(format!("uid-{index}"))
        }

        async fn total_size(&self) -> anyhow::Result<u64> {
            Ok(self.messages.iter().map(|m| m.len() as u64).sum())
        }

        fn delete(&mut self, _index: usize) {}

        fn rollback(&mut self) {}

        async fn commit_deletes(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    async fn transaction_session() -> Pop3Session {
        let mut sess = session();
        let mailbox = VecMailbox {
            messages: vec![
                b"Subject: one\r\n\r\nbody one\r\nmore\r\n".to_vec(),
                b"Subject: two\r\n\r\n.stuffed\r\n".to_vec(),
            ],
        };
        let infos = mailbox.list().await.unwrap();
        sess.attach_mailbox(Box::new(mailbox), infos);
        sess
    }

    #[tokio::test]
    async fn stat_counts_undeleted() {
        let mut sess = transaction_session().await;
        let response = StatCmdHandler
            .on_command(&mut sess, "STAT", None)
            .await
            .unwrap();
        let line = &response.lines()[0];
        assert!(line.starts_with("+OK 2 "), "got {line}");
    }

    #[tokio::test]
    async fn list_whole_maildrop() {
        let mut sess = transaction_session().await;
        let response = ListCmdHandler
            .on_command(&mut sess, "LIST", None)
            .await
            .unwrap();
        let lines = response.lines();
        assert!(lines[0].starts_with("+OK 2 messages"));
        assert!(lines[1].starts_with("1 "));
        assert!(lines[2].starts_with("2 "));
        assert_eq!(lines[3], ".");
    }

    #[tokio::test]
    async fn retr_streams_with_dot_stuffing() {
        let mut sess = transaction_session().await;
        let response = RetrCmdHandler
            .on_command(&mut sess, "RETR", Some("2"))
            .await
            .unwrap();
        let lines = response.lines();
        assert!(lines[0].starts_with("+OK "));
        assert_eq!(lines[1], "Subject: two");
        assert_eq!(lines[2], "");
        // the bare dot line went out stuffed
        assert_eq!(lines[3], "..stuffed");
        assert_eq!(lines.last().unwrap(), ".");
    }

    #[tokio::test]
    async fn retr_missing_message() {
        let mut sess = transaction_session().await;
        let response = RetrCmdHandler
            .on_command(&mut sess, "RETR", Some("9"))
            .await
            .unwrap();
        assert_eq!(response.lines(), &["-ERR no such message 9".to_string()]);
    }

    #[tokio::test]
    async fn top_limits_body_lines() {
        let mut sess = transaction_session().await;
        let response = TopCmdHandler
            .on_command(&mut sess, "TOP", Some("1 1"))
            .await
            .unwrap();
        let lines = response.lines();
        assert_eq!(lines[1], "Subject: one");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "body one");
        // second body line cut off
        assert_eq!(lines[4], ".");
    }

    #[tokio::test]
    async fn dele_marks_and_double_dele_fails() {
        let mut sess = transaction_session().await;
        let response = DeleCmdHandler
            .on_command(&mut sess, "DELE", Some("1"))
            .await
            .unwrap();
        assert_eq!(response.lines(), &["+OK message 1 deleted".to_string()]);

        let response = DeleCmdHandler
            .on_command(&mut sess, "DELE", Some("1"))
            .await
            .unwrap();
        assert_eq!(
            response.lines(),
            &["-ERR message 1 already deleted".to_string()]
        );

        // deleted messages disappear from LIST
        let response = ListCmdHandler
            .on_command(&mut sess, "LIST", None)
            .await
            .unwrap();
        assert!(response.lines()[0].starts_with("+OK 1 messages"));
    }

    #[tokio::test]
    async fn uidl_reports_unique_ids() {
        let mut sess = transaction_session().await;
        let response = UidlCmdHandler
            .on_command(&mut sess, "UIDL", Some("2"))
            .await
            .unwrap();
        assert_eq!(response.lines(), &["+OK 2 uid-1".to_string()]);

        let response = UidlCmdHandler
            .on_command(&mut sess, "UIDL", None)
            .await
            .unwrap();
        let lines = response.lines();
        assert_eq!(lines[1], "1 uid-0");
        assert_eq!(lines[2], "2 uid-1");
    }

    #[tokio::test]
    async fn transaction_commands_refused_before_login() {
        let mut sess = session();
        let response = StatCmdHandler
            .on_command(&mut sess, "STAT", None)
            .await
            .unwrap();
        assert_eq!(
            response.lines(),
            &["-ERR Command not permitted in this state".to_string()]
        );
    }
}
