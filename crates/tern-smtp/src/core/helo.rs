use crate::codes;
use crate::dsn::DsnStatus;
use crate::hook::{HeloHook, HookResult};
use crate::hookable::HookableCmdHandler;
use crate::reply;
use crate::session::{HeloMode, SmtpSession};
use async_trait::async_trait;
use std::sync::Arc;
use tern_proto::{ProtocolSession, Response};

pub fn helo_filter_checks(
    session: &mut SmtpSession,
    verb: &str,
    args: Option<&str>,
) -> Option<Response> {
    // a new introduction resets any transaction in progress
    session.reset_state();
    match args.map(str::trim).filter(|name| !name.is_empty()) {
        None => Some(reply::single(
            codes::SYNTAX_ERROR_ARGUMENTS,
            Some(DsnStatus::permanent(5, 4)),
            format!("Domain address required: {verb}"),
        )),
        Some(name) => {
            session.set_helo_name(name);
            None
        }
    }
}

fn greeting_line(session: &SmtpSession) -> String {
    format!(
        "{} Hello {} [{}]",
        session.hello_name(),
        session.helo_name().unwrap_or("unknown"),
        session.remote_ip(),
    )
}

/// The extension keywords advertised in an EHLO/LHLO reply.
pub fn extension_lines(
    session: &SmtpSession,
    offer_starttls: bool,
    offer_auth: bool,
) -> Vec<String> {
    let mut lines = vec![
        "PIPELINING".to_string(),
        "ENHANCEDSTATUSCODES".to_string(),
        "8BITMIME".to_string(),
    ];
    match session.max_message_size() {
        0 => lines.push("SIZE".to_string()),
        max => lines.push(format!("SIZE {max}")),
    }
    if offer_starttls && !session.is_tls() {
        lines.push("STARTTLS".to_string());
    }
    if offer_auth {
        lines.push("AUTH PLAIN".to_string());
    }
    lines
}

pub fn extended_greeting(
    session: &SmtpSession,
    offer_starttls: bool,
    offer_auth: bool,
) -> Response {
    let mut builder = reply::MultiLine::new(codes::MAIL_OK).line(greeting_line(session));
    for line in extension_lines(session, offer_starttls, offer_auth) {
        builder = builder.line(line);
    }
    builder.build()
}

/// HELO: plain introduction, single-line reply.
pub struct HeloCmdHandler {
    hooks: Vec<Arc<dyn HeloHook>>,
}

impl HeloCmdHandler {
    pub fn new() -> Self {
        Self { hooks: vec![] }
    }
}

impl Default for HeloCmdHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HookableCmdHandler for HeloCmdHandler {
    type Hook = dyn HeloHook;

    fn implemented_verbs(&self) -> &[&'static str] {
        &["HELO"]
    }

    fn hooks(&self) -> &[Arc<dyn HeloHook>] {
        &self.hooks
    }

    fn set_hooks(&mut self, hooks: Vec<Arc<dyn HeloHook>>) {
        self.hooks = hooks;
    }

    async fn do_filter_checks(
        &self,
        session: &mut SmtpSession,
        verb: &str,
        args: Option<&str>,
    ) -> Option<Response> {
        helo_filter_checks(session, verb, args)
    }

    async fn call_hook(
        &self,
        hook: &dyn HeloHook,
        session: &mut SmtpSession,
        _args: Option<&str>,
    ) -> HookResult {
        let name = session.helo_name().unwrap_or_default().to_string();
        hook.do_helo(session, &name).await
    }

    async fn do_core_cmd(
        &self,
        session: &mut SmtpSession,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        session.set_helo_mode(HeloMode::Helo);
        Ok(reply::single(codes::MAIL_OK, None, greeting_line(session)))
    }

    async fn on_hook_accepted(&self, session: &mut SmtpSession) {
        session.set_helo_mode(HeloMode::Helo);
    }
}

/// EHLO: extended introduction; the reply lists the supported extensions.
pub struct EhloCmdHandler {
    hooks: Vec<Arc<dyn HeloHook>>,
    offer_starttls: bool,
    offer_auth: bool,
}

impl EhloCmdHandler {
    pub fn new(offer_starttls: bool, offer_auth: bool) -> Self {
        Self {
            hooks: vec![],
            offer_starttls,
            offer_auth,
        }
    }
}

#[async_trait]
impl HookableCmdHandler for EhloCmdHandler {
    type Hook = dyn HeloHook;

    fn implemented_verbs(&self) -> &[&'static str] {
        &["EHLO"]
    }

    fn hooks(&self) -> &[Arc<dyn HeloHook>] {
        &self.hooks
    }

    fn set_hooks(&mut self, hooks: Vec<Arc<dyn HeloHook>>) {
        self.hooks = hooks;
    }

    async fn do_filter_checks(
        &self,
        session: &mut SmtpSession,
        verb: &str,
        args: Option<&str>,
    ) -> Option<Response> {
        helo_filter_checks(session, verb, args)
    }

    async fn call_hook(
        &self,
        hook: &dyn HeloHook,
        session: &mut SmtpSession,
        _args: Option<&str>,
    ) -> HookResult {
        let name = session.helo_name().unwrap_or_default().to_string();
        hook.do_helo(session, &name).await
    }

    async fn do_core_cmd(
        &self,
        session: &mut SmtpSession,
        _verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        session.set_helo_mode(HeloMode::Ehlo);
        Ok(extended_greeting(session, self.offer_starttls, self.offer_auth))
    }

    async fn on_hook_accepted(&self, session: &mut SmtpSession) {
        session.set_helo_mode(HeloMode::Ehlo);
    }
}
