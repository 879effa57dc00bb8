//! Bounded retry for flaky assertions.
//!
//! Log lines can lag behind the command that produced them, and freshly
//! provisioned devices sometimes need a moment before a check passes. The
//! policy re-runs a failing call with exponential backoff until it succeeds
//! or the attempt ceiling is reached, then surfaces the last error.

use std::fmt::Display;
use std::thread::sleep;
use std::time::Duration;

use tracing::warn;

/// Default number of attempts, including the first call.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Default wait before the second attempt.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Default upper bound for a single wait.
pub const DEFAULT_RETRY_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Classifies errors that may succeed when the call is repeated.
pub trait Retryable {
    /// Returns `true` when another attempt could succeed.
    fn is_retryable(&self) -> bool;
}

/// Attempt ceiling and backoff schedule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BACKOFF)
            .with_max_backoff(DEFAULT_RETRY_MAX_BACKOFF)
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` below one is treated as one.
    #[must_use]
    pub const fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            initial_backoff,
            max_backoff: initial_backoff,
        }
    }

    /// Policy that runs the call exactly once.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Caps each individual wait at `max_backoff`.
    #[must_use]
    pub const fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Returns the attempt ceiling.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns how long to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff.max(self.initial_backoff))
    }

    /// Runs `call`, repeating it while it fails with a retryable error and
    /// attempts remain.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once the
    /// ceiling is exhausted.
    pub fn run<T, E>(&self, operation: &str, mut call: impl FnMut() -> Result<T, E>) -> Result<T, E>
    where
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && err.is_retryable() => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay = ?delay,
                        error = %err,
                        "attempt failed; retrying"
                    );
                    sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rstest::rstest;
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error, Eq, PartialEq)]
    enum FakeError {
        #[error("transient")]
        Transient,
        #[error("fatal")]
        Fatal,
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Transient)
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    #[rstest]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = fast_policy(3).run("op", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(FakeError::Transient)
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[rstest]
    fn surfaces_last_error_when_ceiling_is_reached() {
        let calls = Cell::new(0);
        let result: Result<(), FakeError> = fast_policy(4).run("op", || {
            calls.set(calls.get() + 1);
            Err(FakeError::Transient)
        });
        assert_eq!(result, Err(FakeError::Transient));
        assert_eq!(calls.get(), 4);
    }

    #[rstest]
    fn does_not_retry_fatal_errors() {
        let calls = Cell::new(0);
        let result: Result<(), FakeError> = fast_policy(5).run("op", || {
            calls.set(calls.get() + 1);
            Err(FakeError::Fatal)
        });
        assert_eq!(result, Err(FakeError::Fatal));
        assert_eq!(calls.get(), 1);
    }

    #[rstest]
    fn zero_attempts_still_runs_once() {
        let calls = Cell::new(0);
        let result: Result<(), FakeError> = fast_policy(0).run("op", || {
            calls.set(calls.get() + 1);
            Err(FakeError::Transient)
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[rstest]
    #[case(1, Duration::from_millis(100))]
    #[case(2, Duration::from_millis(200))]
    #[case(3, Duration::from_millis(400))]
    #[case(4, Duration::from_millis(500))]
    #[case(30, Duration::from_millis(500))]
    fn backoff_doubles_up_to_the_cap(#[case] attempt: u32, #[case] expected: Duration) {
        let policy = RetryPolicy::new(5, Duration::from_millis(100))
            .with_max_backoff(Duration::from_millis(500));
        assert_eq!(policy.backoff_for(attempt), expected);
    }
}
