//! Bounded retries with exponential backoff.

use std::time::Duration;

use roster_core::RetryConfig;
use roster_sync::RemoteError;

/// Longest wait between two attempts, whatever the server asks for.
pub const MAX_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Wait before retry number `attempt` (0-based). A server-provided
    /// `Retry-After` wins over the computed backoff.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = retry_after.unwrap_or_else(|| {
            self.base_delay
                .saturating_mul(2u32.saturating_pow(attempt.min(16)))
        });
        delay.min(MAX_DELAY)
    }
}

/// Whether a failed `method` request may be sent again.
///
/// A POST is not idempotent: after a transport error or a plain 5xx the
/// server may already have created the records, so it is resent only when
/// it was refused outright (429, or 503 with `Retry-After`).
pub fn retryable(method: &str, err: &RemoteError, retry_after: Option<Duration>) -> bool {
    if !err.is_transient() {
        return false;
    }
    if !method.eq_ignore_ascii_case("POST") {
        return true;
    }
    match err {
        RemoteError::Status { code: 429, .. } => true,
        RemoteError::Status { code: 503, .. } => retry_after.is_some(),
        _ => false,
    }
}

/// `Retry-After` in its delta-seconds form. HTTP dates are ignored; Graph
/// only sends seconds.
pub fn parse_retry_after(header: Option<&str>) -> Option<Duration> {
    header?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
