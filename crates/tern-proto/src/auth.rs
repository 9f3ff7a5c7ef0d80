use async_trait::async_trait;

/// Credential verification seam shared by SMTP AUTH and POP3 PASS.
///
/// `Ok(Some(identity))` grants access as `identity`; `Ok(None)` means the
/// credentials were rejected. An `Err` signals backend trouble and maps to a
/// temporary failure on the wire.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn authenticate(
        &self,
        username: &str,
        credential: &str,
    ) -> anyhow::Result<Option<String>>;
}
