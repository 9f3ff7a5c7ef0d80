use std::fmt::Display;
use tern_proto::Response;

pub const OK: &str = "+OK";
pub const ERR: &str = "-ERR";

pub fn ok(text: impl Display) -> Response {
    status_line(OK, text)
}

pub fn err(text: impl Display) -> Response {
    status_line(ERR, text)
}

fn status_line(code: &str, text: impl Display) -> Response {
    let text = text.to_string();
    let line = if text.is_empty() {
        code.to_string()
    } else {
        format!("{code} {text}")
    };
    Response::with_line(code, line)
}

/// A multi-line `+OK` reply: status line, dot-stuffed payload lines, and
/// the lone-dot terminator.
pub fn ok_multiline<I, S>(text: impl Display, payload: I) -> Response
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut response = ok(text);
    for line in payload {
        response.push_line(stuff(line.into()));
    }
    response.push_line(".");
    response
}

/// A multi-line `+OK` reply whose payload is raw message bytes.
pub fn ok_with_data(text: impl Display, data: &[u8]) -> Response {
    let text_lines = String::from_utf8_lossy(data);
    let lines = text_lines
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string());
    let mut lines: Vec<String> = lines.collect();
    // a trailing newline would otherwise render as a spurious empty line
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    ok_multiline(text, lines)
}

fn stuff(line: String) -> String {
    if line.starts_with('.') {
        format!(".{line}")
    } else {
        line
    }
}
