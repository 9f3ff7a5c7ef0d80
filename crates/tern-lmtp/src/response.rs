use tern_proto::Response;

/// One reply block per recipient, delivered as a single flattened reply.
///
/// The return code is the first sub-response's; the lines are the
/// concatenation of every sub-response's lines in recipient order; the
/// session ends if any sub-response says so.
pub struct LmtpMultiResponse {
    responses: Vec<Response>,
}

impl LmtpMultiResponse {
    pub fn new(response: Response) -> Self {
        Self {
            responses: vec![response],
        }
    }

    pub fn add_response(&mut self, response: Response) {
        self.responses.push(response);
    }

    pub fn into_response(self) -> Response {
        let code = self.responses[0].ret_code().to_string();
        let end_session = self.responses.iter().any(|r| r.is_end_session());
        let mut flattened = Response::new(code);
        for response in &self.responses {
            for line in response.lines() {
                flattened.push_line(line.clone());
            }
        }
        if end_session {
            flattened.end_session()
        } else {
            flattened
        }
    }
}
