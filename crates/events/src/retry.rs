//! Bounded retry with caller-supplied backoff.

use std::future::Future;
use std::time::Duration;

/// Default number of attempts for listeners.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default backoff unit for listeners.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Attempt count and backoff unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Multiplied by the attempt number to get the wait after that attempt.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// No retries: one attempt.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Wait after the given 1-based failed attempt: `delay * attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

/// Run `op` up to `attempts` times until it succeeds.
///
/// `delay_fn(n)` is the wait after failed attempt `n` (1-based); there is no
/// wait after the last attempt. Returns the last error when every attempt
/// failed.
pub async fn with_retry<T, E, F, Fut, D>(attempts: u32, delay_fn: D, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    D: Fn(u32) -> Duration,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(err),
            Err(_) => {
                tokio::time::sleep(delay_fn(attempt)).await;
                attempt += 1;
            }
        }
    }
}
