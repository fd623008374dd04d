//! Bounded exponential-backoff retry for fallible operations.
//!
//! The retrier catches every failure except the last: once the attempt
//! budget is spent, the final invocation's error is returned to the caller
//! unmodified so root causes stay distinguishable.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::warn;

/// Log target for retry diagnostics.
const RETRY_TARGET: &str = "convoy::retry";

/// Attempt budget and backoff schedule for [`retry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Builds a policy, clamping out-of-range inputs into the valid domain:
    /// at least one attempt and a multiplier of at least 1.0.
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_multiplier: backoff_multiplier.max(1.0),
        }
    }

    /// Number of times the operation may be invoked.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept before the first retry.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Factor applied to the delay after each failed attempt.
    #[must_use]
    pub const fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }
}

impl Default for RetryPolicy {
    /// Matches the reference defaults: four attempts, one second initial
    /// delay, doubling after each failure.
    fn default() -> Self {
        Self::new(4, Duration::from_secs(1), 2.0)
    }
}

/// Invokes `operation` under the policy's attempt budget.
///
/// Failures before the final attempt are logged together with the upcoming
/// delay, slept through, and retried with the delay multiplied by the
/// backoff factor. The final attempt is not caught: its `Result` is handed
/// back verbatim, so a terminal failure carries the original error type.
///
/// With `max_attempts == 1` the retry loop is skipped entirely and the
/// single invocation's result is returned.
///
/// # Errors
///
/// Returns the error produced by the final attempt once the budget is
/// exhausted.
pub fn retry<T, E, F>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: fmt::Display,
{
    retry_with_sleep(policy, operation, thread::sleep)
}

/// Retry loop with an injectable sleep, so tests can observe the backoff
/// schedule without waiting it out.
pub(crate) fn retry_with_sleep<T, E, F, S>(
    policy: &RetryPolicy,
    mut operation: F,
    mut sleep: S,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: fmt::Display,
    S: FnMut(Duration),
{
    let mut delay = policy.initial_delay;
    let mut remaining = policy.max_attempts;
    while remaining > 1 {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) => {
                warn!(
                    target: RETRY_TARGET,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "attempt failed; retrying after delay"
                );
                sleep(delay);
                delay = delay.mul_f64(policy.backoff_multiplier);
                remaining -= 1;
            }
        }
    }
    // Last attempt without catching: the caller sees the original error.
    operation()
}
