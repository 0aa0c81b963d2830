//! Bounded retry with exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Retry settings for the editing step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 = no retries).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub backoff_base_ms: u64,
    /// Upper bound on any single delay.
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

/// Outcome of [`retry_transient`]: the final result plus attempts made.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// `is_transient` decides which errors are retried; `min_delay` lets an error
/// demand a longer wait (e.g. a provider's retry-after) than the backoff.
/// `on_retry` is invoked before each re-attempt with the upcoming attempt number.
pub async fn retry_transient<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    min_delay: impl Fn(&E) -> Option<Duration>,
    mut on_retry: impl FnMut(u32),
    mut op: F,
) -> Attempted<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(err) if attempt < max_attempts && is_transient(&err) => {
                let delay = policy
                    .backoff(attempt)
                    .max(min_delay(&err).unwrap_or_default());
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                on_retry(attempt);
            }
            Err(err) => {
                return Attempted {
                    result: Err(err),
                    attempts: attempt,
                }
            }
        }
    }
}
