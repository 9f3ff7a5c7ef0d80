/// A reply to be written back to the client.
///
/// The return code is kept as text so that both numeric SMTP/LMTP codes
/// (`"250"`) and POP3 status indicators (`"+OK"`, `"-ERR"`) fit the same
/// shape. `lines` holds fully rendered wire lines without the trailing CRLF;
/// multi-line replies simply carry more than one entry. When `end_session`
/// is set the transport closes the connection after flushing the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    code: String,
    lines: Vec<String>,
    end_session: bool,
}

impl Response {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            lines: vec![],
            end_session: false,
        }
    }

    /// A single-line reply.
    pub fn with_line(code: impl Into<String>, line: impl Into<String>) -> Self {
        let mut response = Self::new(code);
        response.push_line(line);
        response
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Mark this reply as the last one of the session.
    pub fn end_session(mut self) -> Self {
        self.end_session = true;
        self
    }

    pub fn ret_code(&self) -> &str {
        &self.code
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_end_session(&self) -> bool {
        self.end_session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line() {
        let response = Response::with_line("250", "250 OK");
        assert_eq!(response.ret_code(), "250");
        assert_eq!(response.lines(), &["250 OK".to_string()]);
        assert!(!response.is_end_session());
    }

    #[test]
    fn end_session_flag() {
        let response = Response::with_line("221", "221 Bye").end_session();
        assert!(response.is_end_session());
    }

    #[test]
    fn multi_line() {
        let mut response = Response::new("250");
        response.push_line("250-first");
        response.push_line("250 last");
        assert_eq!(response.lines().len(), 2);
    }
}
