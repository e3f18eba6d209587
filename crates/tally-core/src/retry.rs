//! Bounded exponential-backoff retry combinator.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_RETRY_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 4_000;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Errors that can tell the retry loop whether another attempt is worthwhile.
pub trait RetryableError {
    fn is_retryable(&self) -> bool;

    /// Server-provided lower bound on the next delay, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Delay after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let scaled = self
            .base_delay
            .checked_mul(1_u32 << shift)
            .unwrap_or(self.max_delay);
        scaled.min(self.max_delay)
    }

    fn delay_with_floor(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        let backoff = self.delay_for_attempt(attempt);
        match retry_after {
            Some(floor) => backoff.max(floor),
            None => backoff,
        }
    }
}

/// Runs `operation` until it succeeds, fails terminally, or exhausts the policy.
///
/// The closure receives the 1-based attempt number. The last error is returned
/// unchanged once no further attempt is allowed.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut run: F,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0_usize;
    loop {
        attempt = attempt.saturating_add(1);
        match run(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= max_attempts || !error.is_retryable() {
                    return Err(error);
                }
                let delay = policy.delay_with_floor(attempt, error.retry_after());
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
