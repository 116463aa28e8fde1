//! Retry with exponential backoff and rate-limit waits.
//!
//! One loop shared by every remote call. Transient failures back off
//! `base * 2^n` and consume the attempt budget. Rate-limit responses wait the
//! server-provided delay and count against a separate cap of the same size.

use std::future::Future;
use std::time::Duration;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    /// Wait the given delay (or the policy default) and try again.
    RateLimited(Option<Duration>),
    Abort,
}

/// Attempt cap and delays for one remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed for transient failures; also caps rate-limit waits.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Used when a rate-limit response carries no delay hint.
    pub default_rate_limit_delay: Duration,
}

impl RetryPolicy {
    /// Policy with no waits, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            default_rate_limit_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (0-indexed): `base * 2^attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Delay before retrying a rate-limited call.
    pub fn rate_limit_delay(&self, hint: Option<Duration>) -> Duration {
        hint.unwrap_or(self.default_rate_limit_delay)
    }
}

/// Retry an async operation under `policy`.
///
/// - `operation_name`: used in log lines
/// - `classifier`: inspects an error and returns the retry decision
/// - `operation`: the async closure to retry
///
/// Returns the first `Ok` result, or the last error once the classifier
/// aborts or a budget runs out.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    operation_name: &str,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut failed_attempts = 0u32;
    let mut rate_limit_waits = 0u32;

    loop {
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };

        let delay = match classifier(&err) {
            RetryAction::Abort => return Err(err),
            RetryAction::RateLimited(hint) => {
                if rate_limit_waits >= max_attempts {
                    tracing::warn!(
                        operation = operation_name,
                        waits = rate_limit_waits,
                        "Still rate limited, giving up"
                    );
                    return Err(err);
                }
                rate_limit_waits += 1;
                let delay = policy.rate_limit_delay(hint);
                tracing::warn!(
                    operation = operation_name,
                    wait = rate_limit_waits,
                    delay_secs = delay.as_secs(),
                    "Rate limited, waiting before retry"
                );
                delay
            }
            RetryAction::Retry => {
                failed_attempts += 1;
                if failed_attempts >= max_attempts {
                    tracing::warn!(
                        operation = operation_name,
                        attempts = failed_attempts,
                        error = %err,
                        "Retries exhausted"
                    );
                    return Err(err);
                }
                let delay = policy.backoff_delay(failed_attempts - 1);
                tracing::warn!(
                    operation = operation_name,
                    attempt = failed_attempts,
                    max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "Retryable error, backing off"
                );
                delay
            }
        };

        tokio::time::sleep(delay).await;
    }
}
