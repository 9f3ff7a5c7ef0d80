//! hickory-resolver implementation of the SMTP [`DnsService`] seam.

use async_trait::async_trait;
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use tern_smtp::{DnsError, DnsService};

/// MX resolution backed by the system resolver configuration.
pub struct HickoryDnsService {
    resolver: TokioAsyncResolver,
}

impl HickoryDnsService {
    pub fn from_system_conf() -> Result<Self, DnsError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|err| DnsError::Permanent(err.to_string()))?;
        Ok(Self { resolver })
    }

    pub fn with_resolver(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl DnsService for HickoryDnsService {
    async fn find_mx_records(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let records = lookup
                    .iter()
                    .map(|mx| (mx.preference(), mx.exchange().to_ascii()))
                    .collect();
                Ok(order_mx_hosts(records))
            }
            Err(err) => classify(err).map(|_| vec![]),
        }
    }
}

/// Sort by preference and normalize names. A lone `.` exchange is the null
/// MX (RFC 7505): the domain explicitly receives no mail, so it drops out
/// and an otherwise-empty answer stays empty.
fn order_mx_hosts(mut records: Vec<(u16, String)>) -> Vec<String> {
    records.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    records
        .into_iter()
        .map(|(_, host)| host.trim_end_matches('.').to_string())
        .filter(|host| !host.is_empty())
        .collect()
}

/// `NoRecordsFound` means the domain answered and simply has no MX: that is
/// the permanent "no records" outcome the hook turns into a hard failure.
/// Everything else (timeouts, refused, broken upstream) may clear up, so it
/// maps to the temporary variant.
fn classify(err: ResolveError) -> Result<(), DnsError> {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => Ok(()),
        _ => {
            tracing::debug!("MX lookup failed: {err}");
            Err(DnsError::Temporary(err.to_string()))
        }
    }
}
