//! Fast-fail hooks: cheap checks that reject hopeless transactions before
//! any message bytes flow.

use crate::codes;
use crate::dns::{DnsError, DnsService};
use crate::dsn::DsnStatus;
use crate::hook::{HookResult, HookReturnCode, MailHook};
use crate::parser::ReversePath;
use crate::session::SmtpSession;
use async_trait::async_trait;
use std::sync::Arc;

/// Rejects MAIL FROM senders whose domain has no valid MX records.
///
/// The null sender and address-literal domains are exempt. A temporary
/// resolution failure yields DENYSOFT so a legitimate sender behind a flaky
/// resolver is not permanently bounced.
pub struct ValidSenderDomainHandler {
    dns: Arc<dyn DnsService>,
}

impl ValidSenderDomainHandler {
    pub fn new(dns: Arc<dyn DnsService>) -> Self {
        Self { dns }
    }
}

#[async_trait]
impl MailHook for ValidSenderDomainHandler {
    async fn do_mail(&self, _session: &mut SmtpSession, sender: &ReversePath) -> HookResult {
        let Some(domain) = sender.domain_name() else {
            return HookResult::declined();
        };

        match self.dns.find_mx_records(domain).await {
            Ok(records) if records.is_empty() => HookResult::with_response(
                HookReturnCode::Deny,
                codes::SYNTAX_ERROR_ARGUMENTS,
                DsnStatus::permanent(1, 7),
                format!("sender <{sender}> contains a domain with no valid MX records"),
            ),
            Ok(_) => HookResult::declined(),
            Err(DnsError::Temporary(err)) => {
                tracing::debug!("MX lookup for {domain} failed temporarily: {err}");
                HookResult::with_response(
                    HookReturnCode::DenySoft,
                    codes::LOCAL_ERROR,
                    DsnStatus::temporary(4, 3),
                    "Temporary failure resolving sender domain, please try again later",
                )
            }
            Err(DnsError::Permanent(err)) => {
                tracing::debug!("MX lookup for {domain} failed: {err}");
                HookResult::with_response(
                    HookReturnCode::Deny,
                    codes::SYNTAX_ERROR_ARGUMENTS,
                    DsnStatus::permanent(1, 7),
                    format!("sender <{sender}> contains a domain with no valid MX records"),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_mail_args;
    use crate::session::test_support::session;
    use std::collections::HashMap;

    struct FixtureDns {
        zones: HashMap<String, Vec<String>>,
        temp_fail: bool,
    }

    #[async_trait]
    impl DnsService for FixtureDns {
        async fn find_mx_records(&self, domain: &str) -> Result<Vec<String>, DnsError> {
            if self.temp_fail {
                return Err(DnsError::Temporary("resolver down".to_string()));
            }
            Ok(self.zones.get(domain).cloned().unwrap_or_default())
        }
    }

    fn sender(args: &str) -> ReversePath {
        parse_mail_args(args).unwrap().address
    }

    #[tokio::test]
    async fn missing_mx_is_denied_with_517() {
        let hook = ValidSenderDomainHandler::new(Arc::new(FixtureDns {
            zones: HashMap::new(),
            temp_fail: false,
        }));
        let mut sess = session();
        let result = hook
            .do_mail(&mut sess, &sender("FROM:<x@nodomain.invalid>"))
            .await;
        assert_eq!(result.code, HookReturnCode::Deny);
        assert_eq!(result.smtp_code, Some(501));
        assert_eq!(result.dsn, Some(DsnStatus::permanent(1, 7)));
        assert!(result.message.unwrap().contains("no valid MX records"));
    }

    #[tokio::test]
    async fn present_mx_declines() {
        let hook = ValidSenderDomainHandler::new(Arc::new(FixtureDns {
            zones: HashMap::from([(
                "ok.example".to_string(),
                vec!["mx1.ok.example".to_string()],
            )]),
            temp_fail: false,
        }));
        let mut sess = session();
        let result = hook.do_mail(&mut sess, &sender("FROM:<x@ok.example>")).await;
        assert_eq!(result.code, HookReturnCode::Declined);
    }

    #[tokio::test]
    async fn temporary_failure_is_soft() {
        let hook = ValidSenderDomainHandler::new(Arc::new(FixtureDns {
            zones: HashMap::new(),
            temp_fail: true,
        }));
        let mut sess = session();
        let result = hook.do_mail(&mut sess, &sender("FROM:<x@ok.example>")).await;
        assert_eq!(result.code, HookReturnCode::DenySoft);
        assert_eq!(result.smtp_code, Some(451));
    }

    #[tokio::test]
    async fn null_sender_is_exempt() {
        let hook = ValidSenderDomainHandler::new(Arc::new(FixtureDns {
            zones: HashMap::new(),
            temp_fail: false,
        }));
        let mut sess = session();
        let result = hook.do_mail(&mut sess, &ReversePath::NullSender).await;
        assert_eq!(result.code, HookReturnCode::Declined);
    }
}
