//! Demo configuration loaded from environment variables.

use std::time::Duration;

use checkout::{Pacing, RetryPolicy};

/// Demo configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: PostgreSQL connection string (default: unset, in-memory store)
/// - `DEMO_PACING_MS`: delay between the two uncoordinated writes (default: `0`)
/// - `DEMO_COMMIT_PACING_MS`: how long each transaction stays open before commit (default: `0`)
/// - `TX_MAX_ATTEMPTS`: transaction attempts on write conflict (default: `3`)
/// - `TX_RETRY_BACKOFF_MS`: wait between attempts (default: `10`)
/// - `PRINT_METRICS`: print the Prometheus exposition after the run (default: `false`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: Option<String>,
    pub pacing_ms: u64,
    pub commit_pacing_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub print_metrics: bool,
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            pacing_ms: lookup("DEMO_PACING_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pacing_ms),
            commit_pacing_ms: lookup("DEMO_COMMIT_PACING_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.commit_pacing_ms),
            max_attempts: lookup("TX_MAX_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            retry_backoff_ms: lookup("TX_RETRY_BACKOFF_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.retry_backoff_ms),
            print_metrics: lookup("PRINT_METRICS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.print_metrics),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// Returns the retry policy for coordinated purchases.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    /// Returns the pacing for both purchase paths.
    pub fn pacing(&self) -> Pacing {
        Pacing::between_writes(Duration::from_millis(self.pacing_ms))
            .with_commit_delay(Duration::from_millis(self.commit_pacing_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            pacing_ms: 0,
            commit_pacing_ms: 0,
            max_attempts: 3,
            retry_backoff_ms: 10,
            print_metrics: false,
            log_level: "info".to_string(),
        }
    }
}
