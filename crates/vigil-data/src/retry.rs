//! Bounded retry with exponential backoff.
//!
//! External calls (market data, notification delivery) must never block a
//! cycle indefinitely: a policy caps the attempt count and the per-attempt
//! delay, and only transient failures are retried at all.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry policy for calls to external collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Run `op`, retrying transient failures up to the attempt budget.
    ///
    /// `describe` names the call in retry logs; `is_transient` decides
    /// which errors are worth repeating.
    pub async fn run<T, E, F, Fut>(
        &self,
        describe: &str,
        is_transient: impl Fn(&E) -> bool,
        mut op: F,
    ) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && is_transient(&err) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying {describe}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use rstest::rstest;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 4)]
    #[case(4, 4)] // clamped at max_delay
    fn test_delay_progression(#[case] attempt: u32, #[case] expected_ms: u64) {
        let policy = fast_policy(5);
        assert_eq!(
            policy.delay_for_attempt(attempt),
            Duration::from_millis(expected_ms)
        );
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let policy = fast_policy(4);
        let calls = AtomicU32::new(0);

        let result: Result<u32, DataError> = policy
            .run("fetch", DataError::is_transient, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(DataError::RateLimit { retry_after_ms: 1 })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_fails_immediately() {
        let policy = fast_policy(4);
        let calls = AtomicU32::new(0);

        let result: Result<u32, DataError> = policy
            .run("fetch", DataError::is_transient, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DataError::Parse("bad payload".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_budget_exhausted() {
        let policy = fast_policy(3);
        let calls = AtomicU32::new(0);

        let result: Result<u32, DataError> = policy
            .run("fetch", DataError::is_transient, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DataError::RateLimit { retry_after_ms: 1 }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_none_policy_single_attempt() {
        let policy = RetryPolicy::none();
        let calls = AtomicU32::new(0);

        let result: Result<u32, DataError> = policy
            .run("fetch", |_| true, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DataError::RateLimit { retry_after_ms: 1 }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
