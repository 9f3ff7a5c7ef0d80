use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DnsError {
    /// Resolution failed in a way that may succeed on retry; maps to a
    /// temporary reply on the wire.
    #[error("temporary DNS resolution failure: {0}")]
    Temporary(String),
    #[error("DNS resolution failed: {0}")]
    Permanent(String),
}

/// Narrow DNS seam consumed by the fast-fail hooks. A real resolver lives
/// in `tern-dns`; tests plug in fixtures.
#[async_trait]
pub trait DnsService: Send + Sync {
    /// MX host names for `domain`, empty when the domain exists but has no
    /// usable MX records.
    async fn find_mx_records(&self, domain: &str) -> Result<Vec<String>, DnsError>;
}
