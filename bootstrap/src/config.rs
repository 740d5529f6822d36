//! Bootstrap workflow configuration, grounded on
//! `composable_rust_auth::config::MagicLinkConfig`'s builder-with-const-setters
//! shape: values the application provides, never hardcoded.

use chrono::Duration;

/// Configuration for the bootstrap saga and its worker (§4.3, §4.4).
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Base URL used to build invitation accept links
    /// (`{base_url}/invitations/accept?token={token}`).
    pub base_url: String,

    /// How long an issued invitation remains acceptable.
    ///
    /// Default: 7 days.
    pub invitation_ttl: Duration,

    /// Per-activity schedule-to-close deadline: the maximum wall-clock time an
    /// activity (including its retries) is allowed before the saga gives up
    /// and runs compensation.
    ///
    /// Default: 5 minutes.
    pub activity_deadline: Duration,

    /// Base delay for an activity's exponential retry backoff.
    ///
    /// Default: 500 milliseconds.
    pub retry_base_delay: Duration,

    /// Maximum number of worker processes allowed to poll the same queue
    /// concurrently before a new one refuses to start, a simple guard against
    /// runaway horizontal scaling overwhelming the database with advisory
    /// lock contention.
    ///
    /// Default: 8.
    pub max_workers: usize,

    /// How often an idle worker polls for pending rows when `LISTEN/NOTIFY`
    /// hasn't delivered a wakeup (defensive poll, not the primary signal).
    ///
    /// Default: 30 seconds.
    pub poll_interval: Duration,
}

impl BootstrapConfig {
    /// Create configuration with every default except `base_url`.
    #[must_use]
    pub const fn new(base_url: String) -> Self {
        Self {
            base_url,
            invitation_ttl: Duration::days(7),
            activity_deadline: Duration::minutes(5),
            retry_base_delay: Duration::milliseconds(500),
            max_workers: 8,
            poll_interval: Duration::seconds(30),
        }
    }

    /// Set the invitation time-to-live.
    #[must_use]
    pub const fn with_invitation_ttl(mut self, ttl: Duration) -> Self {
        self.invitation_ttl = ttl;
        self
    }

    /// Set the per-activity schedule-to-close deadline.
    #[must_use]
    pub const fn with_activity_deadline(mut self, deadline: Duration) -> Self {
        self.activity_deadline = deadline;
        self
    }

    /// Set the retry backoff base delay.
    #[must_use]
    pub const fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Set the worker concurrency ceiling.
    #[must_use]
    pub const fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max;
        self
    }

    /// Set the defensive poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_only_requested_fields() {
        let config = BootstrapConfig::new("https://app.example.com".to_string())
            .with_max_workers(4);

        assert_eq!(config.base_url, "https://app.example.com");
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.invitation_ttl, Duration::days(7));
    }
}
