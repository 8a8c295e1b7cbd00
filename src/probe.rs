//! Endpoint readiness probing.
//!
//! Replaces fixed-duration startup sleeps: the store is polled with a cheap
//! control call until it answers, with capped exponential backoff between
//! attempts so a cold-starting emulator is not hammered.

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, DEFAULT_CEILING_FACTOR};
use crate::store::TableStore;

/// Probe tuning.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub interval: Duration,
    /// Bound on each individual attempt.
    pub attempt_timeout: Duration,
    /// Longest delay between attempts, as a multiple of `interval`.
    pub ceiling_factor: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(250),
            attempt_timeout: Duration::from_secs(2),
            ceiling_factor: DEFAULT_CEILING_FACTOR,
        }
    }
}

impl ProbeConfig {
    /// Worst-case time spent sleeping between attempts.
    pub fn max_total_wait(&self) -> Duration {
        let mut backoff = Backoff::new(self.interval, self.ceiling_factor);
        (1..self.max_attempts).map(|_| backoff.next_delay()).sum()
    }
}

/// Outcome of a probe run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub ready: bool,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl ProbeResult {
    fn cancelled(attempts: u32, last_error: Option<String>) -> Self {
        let last_error = Some(match last_error {
            Some(e) => format!("{} (cancelled)", e),
            None => "cancelled".to_string(),
        });
        Self {
            ready: false,
            attempts,
            last_error,
        }
    }
}

/// Poll `store` until it answers a ping or `config.max_attempts` run out.
///
/// Any successful answer counts as ready. Every failure, including
/// malformed answers from a half-started endpoint, is recorded and
/// retried. Cancellation aborts immediately with `ready = false`.
pub async fn probe(
    store: &dyn TableStore,
    config: &ProbeConfig,
    cancel: &CancellationToken,
) -> ProbeResult {
    let mut backoff = Backoff::new(config.interval, config.ceiling_factor);
    let mut last_error: Option<String> = None;

    for attempt in 1..=config.max_attempts {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ProbeResult::cancelled(attempt - 1, last_error),
            outcome = tokio::time::timeout(config.attempt_timeout, store.ping()) => outcome,
        };

        match outcome {
            Ok(Ok(())) => {
                info!(attempt, "endpoint ready");
                return ProbeResult {
                    ready: true,
                    attempts: attempt,
                    last_error,
                };
            }
            Ok(Err(e)) => {
                debug!(attempt, kind = ?e.kind, error = %e, "endpoint not ready");
                last_error = Some(e.to_string());
            }
            Err(_) => {
                debug!(attempt, timeout = ?config.attempt_timeout, "probe attempt timed out");
                last_error = Some(format!(
                    "probe attempt timed out after {:?}",
                    config.attempt_timeout
                ));
            }
        }

        if attempt < config.max_attempts {
            let delay = backoff.next_delay();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return ProbeResult::cancelled(attempt, last_error),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    warn!(
        attempts = config.max_attempts,
        last_error = last_error.as_deref().unwrap_or("none"),
        "endpoint never became ready"
    );
    ProbeResult {
        ready: false,
        attempts: config.max_attempts,
        last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::store::memory::MemoryStore;

    #[test]
    fn max_total_wait_respects_ceiling() {
        let config = ProbeConfig {
            max_attempts: 6,
            interval: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(1),
            ceiling_factor: 8,
        };
        // 100 + 200 + 400 + 800 + 800
        assert_eq!(config.max_total_wait(), Duration::from_millis(2300));
    }

    #[test]
    fn single_attempt_never_waits() {
        let config = ProbeConfig {
            max_attempts: 1,
            ..ProbeConfig::default()
        };
        assert_eq!(config.max_total_wait(), Duration::ZERO);
    }

    #[test]
    fn cancelled_result_keeps_last_error() {
        let result = ProbeResult::cancelled(2, Some("Connection refused".to_string()));
        assert!(!result.ready);
        assert_eq!(result.last_error.as_deref(), Some("Connection refused (cancelled)"));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_replies_are_retried() {
        let store = MemoryStore::new().failing_pings(vec![
            StoreError::malformed("unexpected response body"),
            StoreError::permanent("UnrecognizedClientException: bad signature"),
        ]);
        let config = ProbeConfig {
            max_attempts: 5,
            interval: Duration::from_millis(100),
            ..ProbeConfig::default()
        };

        let result = probe(&store, &config, &CancellationToken::new()).await;

        assert!(result.ready);
        assert_eq!(result.attempts, 3);
        assert_eq!(store.ping_calls(), 3);
        assert_eq!(
            result.last_error.as_deref(),
            Some("UnrecognizedClientException: bad signature")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_reply_on_last_attempt_is_recorded() {
        let store = MemoryStore::new().failing_pings(vec![
            StoreError::malformed("truncated response"),
            StoreError::malformed("truncated response"),
        ]);
        let config = ProbeConfig {
            max_attempts: 2,
            interval: Duration::from_millis(100),
            ..ProbeConfig::default()
        };

        let result = probe(&store, &config, &CancellationToken::new()).await;

        assert!(!result.ready);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.last_error.as_deref(), Some("truncated response"));
    }
}
