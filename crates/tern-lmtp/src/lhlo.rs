use async_trait::async_trait;
use std::sync::Arc;
use tern_proto::{CommandHandler, Response};
use tern_smtp::core::{extended_greeting, helo_filter_checks};
use tern_smtp::hookable::HookableCmdHandler;
use tern_smtp::{codes, dsn::DsnStatus, reply, HeloHook, HeloMode, HookResult, SmtpSession};

/// LHLO: the LMTP introduction. Same shape as EHLO, but records the LHLO
/// mode and never offers STARTTLS-less extensions it cannot back.
pub struct LhloCmdHandler {
    hooks: Vec<Arc<dyn HeloHook>>,
    offer_starttls: bool,
    offer_auth: bool,
}

impl LhloCmdHandler {
    pub fn new(offer_starttls: bool, offer_auth: bool) -> Self {
        Self {
            hooks: vec![],
            offer_starttls,
            offer_auth,
        }
    }
}

#[async_trait]
impl HookableCmdHandler for LhloCmdHandler {
    type Hook = dyn HeloHook;

    fn implemented_verbs(&self) -> &[&'static str] {
        &["LHLO"]
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
        session.set_helo_mode(HeloMode::Lhlo);
        Ok(extended_greeting(session, self.offer_starttls, self.offer_auth))
    }

    async fn on_hook_accepted(&self, session: &mut SmtpSession) {
        session.set_helo_mode(HeloMode::Lhlo);
    }
}

/// RFC 2033 §4.1: an LMTP server must answer HELO and EHLO with a
/// permanent failure.
pub struct HeloNotSupportedCmdHandler;

#[async_trait]
impl CommandHandler<SmtpSession> for HeloNotSupportedCmdHandler {
    fn verbs(&self) -> &[&'static str] {
        &["HELO", "EHLO"]
    }

    async fn on_command(
        &self,
        _session: &mut SmtpSession,
        verb: &str,
        _args: Option<&str>,
    ) -> anyhow::Result<Response> {
        Ok(reply::single(
            codes::UNRECOGNIZED_COMMAND,
            Some(DsnStatus::permanent(5, 1)),
            format!("{verb} not supported, use LHLO"),
        ))
    }
}
