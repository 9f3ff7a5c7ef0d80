use crate::dsn::DsnStatus;
use std::fmt::Display;
use tern_proto::Response;

/// A single-line SMTP reply, optionally carrying an enhanced status code.
pub fn single(code: u16, dsn: Option<DsnStatus>, text: impl Display) -> Response {
    let line = match dsn {
        Some(dsn) => format!("{code} {dsn} {text}"),
        None => format!("{code} {text}"),
    };
    Response::with_line(code.to_string(), line)
}

/// Builds a multi-line SMTP reply; all but the last line are rendered with
/// the `250-` continuation separator.
pub struct MultiLine {
    code: u16,
    texts: Vec<String>,
}

impl MultiLine {
    pub fn new(code: u16) -> Self {
        Self { code, texts: vec![] }
    }

    pub fn line(mut self, text: impl Display) -> Self {
        self.texts.push(text.to_string());
        self
    }

    pub fn build(self) -> Response {
        let mut response = Response::new(self.code.to_string());
        let last = self.texts.len().saturating_sub(1);
        for (n, text) in self.texts.iter().enumerate() {
            let sep = if n == last { ' ' } else { '-' };
            response.push_line(format!("{}{}{}", self.code, sep, text));
        }
        response
    }
}
