//! Subdomain provisioning (`SPEC_FULL.md` §4.4, §6.5).

use std::future::Future;
use std::pin::Pin;

use crate::error::ActivityError;

/// A provisioned DNS record, as returned by [`DnsProvider::configure`].
#[derive(Debug, Clone)]
pub struct DnsRecord {
    /// The vendor's identifier for this record, needed to remove it later.
    pub provider_record_id: String,
    /// The fully-qualified subdomain the record points at.
    pub fqdn: String,
}

/// Configures and verifies organization subdomains. Dyn-compatible so it can
/// be held as `Arc<dyn DnsProvider>` inside the saga's `BootstrapEnvironment`.
pub trait DnsProvider: Send + Sync {
    /// Create a DNS record for `subdomain`.
    ///
    /// # Errors
    ///
    /// [`ActivityError::Transient`] for a retryable vendor failure,
    /// [`ActivityError::Terminal`] if `subdomain` is already taken or invalid.
    fn configure(
        &self,
        subdomain: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DnsRecord, ActivityError>> + Send + '_>>;

    /// Confirm the record created by [`DnsProvider::configure`] resolves.
    ///
    /// # Errors
    ///
    /// [`ActivityError::Transient`] if it doesn't resolve yet (propagation
    /// delay — the runtime is expected to retry up to the activity's
    /// schedule-to-close deadline), [`ActivityError::Terminal`] if the
    /// record is gone or misconfigured.
    fn verify(
        &self,
        record: &DnsRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActivityError>> + Send + '_>>;

    /// Remove a previously configured record (compensation).
    ///
    /// # Errors
    ///
    /// [`ActivityError::Transient`] for a retryable vendor failure.
    fn remove(
        &self,
        record: &DnsRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActivityError>> + Send + '_>>;
}

/// Logs DNS operations to the console instead of calling a registrar API,
/// grounded on `composable_rust_auth::providers::console_email::ConsoleEmailProvider`'s
/// zero-field, log-instead-of-call shape. Always succeeds immediately, so
/// `verify` never needs the retry path this trait's contract describes — a
/// real provider will.
#[derive(Clone, Debug, Default)]
pub struct ConsoleDnsProvider;

impl ConsoleDnsProvider {
    /// Build a console DNS provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DnsProvider for ConsoleDnsProvider {
    fn configure(
        &self,
        subdomain: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DnsRecord, ActivityError>> + Send + '_>> {
        let subdomain = subdomain.to_string();
        Box::pin(async move {
            let fqdn = format!("{subdomain}.example-platform.test");
            tracing::info!(fqdn = %fqdn, "🌐 DNS record configured (console provider)");
            Ok(DnsRecord {
                provider_record_id: format!("console-{subdomain}"),
                fqdn,
            })
        })
    }

    fn verify(
        &self,
        record: &DnsRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActivityError>> + Send + '_>> {
        let fqdn = record.fqdn.clone();
        Box::pin(async move {
            tracing::info!(fqdn = %fqdn, "🌐 DNS record verified (console provider)");
            Ok(())
        })
    }

    fn remove(
        &self,
        record: &DnsRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ActivityError>> + Send + '_>> {
        let fqdn = record.fqdn.clone();
        Box::pin(async move {
            tracing::info!(fqdn = %fqdn, "🌐 DNS record removed (console provider)");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn console_provider_round_trips() {
        let provider = ConsoleDnsProvider::new();
        let record = provider.configure("acme-health").await.unwrap();
        assert_eq!(record.fqdn, "acme-health.example-platform.test");
        provider.verify(&record).await.unwrap();
        provider.remove(&record).await.unwrap();
    }
}
