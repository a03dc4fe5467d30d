//! Bounded retry policies for network-calling operations.
//!
//! Two entry points share one [`RetryPolicy`]:
//! - [`retry_with_backoff`] retries a fallible call while a classifier says
//!   the error is transient (used per storage request).
//! - [`retry_until`] retries a whole operation until its outcome satisfies a
//!   stop predicate (used for the EXIF phase of a sync).

use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `min(base * 2^retry, max)` plus random jitter in `0..base`.
    Exponential { base: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Treated as at least 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(500),
                max: Duration::from_secs(10),
            },
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Compute the delay before retry number `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
                let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
                let exp = base_ms.saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
                let jitter = if base_ms > 0 {
                    rand::thread_rng().gen_range(0..base_ms)
                } else {
                    0
                };
                Duration::from_millis(exp.min(max_ms).saturating_add(jitter))
            }
        }
    }
}

/// Retry an async operation while `classifier` deems its error transient.
///
/// Returns the first `Ok`, the first error classified `Abort`, or the last
/// error once attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total = policy.attempts();
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                attempt += 1;
                if classifier(&e) == RetryAction::Abort || attempt >= total {
                    return Err(e);
                }
                let delay = policy.delay_for_retry(attempt - 1);
                tracing::warn!(
                    attempt,
                    total,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Run `operation` until `done` accepts its outcome or attempts run out.
///
/// The operation receives the 1-based attempt number. Returns the accepted
/// outcome, or the last one produced.
pub async fn retry_until<F, Fut, T, S>(policy: &RetryPolicy, done: S, mut operation: F) -> T
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    S: Fn(&T) -> bool,
{
    let total = policy.attempts();
    let mut attempt = 1;

    loop {
        let outcome = operation(attempt).await;
        if done(&outcome) || attempt >= total {
            return outcome;
        }
        let delay = policy.delay_for_retry(attempt - 1);
        tracing::info!(
            attempt,
            total,
            delay_ms = delay.as_millis() as u64,
            "Attempt did not succeed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
