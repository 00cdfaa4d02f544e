//! Bounded retry with pure exponential backoff.
//!
//! Every failure is treated as retryable. Operations handed to the executor
//! must be safe to re-run (same blob to the same path, same metadata row).

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::RecorderError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 600;

/// Retry policy: attempt 1 runs immediately, attempt k > 1 waits
/// `base_delay * 2^(k-2)` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait before the given 1-based attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `operation` until it succeeds or `max_attempts` is reached.
    ///
    /// `label` only feeds the logs.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RecorderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    warn!("{} failed on final attempt {}: {:#}", label, attempt, e);
                    return Err(RecorderError::RetryExhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    attempt += 1;
                    let delay = self.delay_before(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {}ms: {:#}",
                        label,
                        attempt - 1,
                        max_attempts,
                        delay.as_millis(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(600));
    }

    #[test]
    fn test_delay_schedule_is_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(600));
        assert_eq!(policy.delay_before(3), Duration::from_millis(1200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(2400));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();
        let started = tokio::time::Instant::now();

        let counter = Arc::clone(&calls);
        let result = policy
            .run("flaky", move || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        anyhow::bail!("transient failure {}", n);
                    }
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(1800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_carries_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default();

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = policy
            .run("always-fails", move || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    anyhow::bail!("failure {}", n)
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RecorderError::RetryExhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source.to_string(), "failure 3");
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success_does_not_wait() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60));
        let value = policy.run("ok", || async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }
}
