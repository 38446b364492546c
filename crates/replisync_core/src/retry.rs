//! Retry combinator for conflict-prone units of work.
//!
//! A unit of work reports each attempt as an [`Attempt`]: finished,
//! failed with a conflict worth retrying, or failed for good. [`retry`]
//! reruns the unit from scratch on `Retryable` until it succeeds, fails
//! fatally, or the attempt budget in [`RetryConfig`] runs out.

use crate::config::RetryConfig;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The unit finished.
    Done(T),
    /// The unit hit a transient conflict and may be rerun.
    Retryable(E),
    /// The unit failed and must not be rerun.
    Fatal(E),
}

impl<T, E> Attempt<T, E> {
    /// Classifies a result using `is_retryable` on the error.
    pub fn classify(result: Result<T, E>, is_retryable: impl FnOnce(&E) -> bool) -> Self {
        match result {
            Ok(value) => Attempt::Done(value),
            Err(err) if is_retryable(&err) => Attempt::Retryable(err),
            Err(err) => Attempt::Fatal(err),
        }
    }
}

/// Failure of a retried unit of work.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt was retryable; `last` is the final conflict.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the last attempt.
        last: E,
    },
    /// An attempt failed fatally.
    Fatal(E),
}

/// Pauses between attempts.
pub trait Sleeper {
    /// Blocks for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Runs `unit` until it finishes, fails fatally, or the budget is spent.
///
/// `unit` receives the 0-indexed attempt number. Before every attempt after
/// the first, `sleeper` waits [`RetryConfig::delay_for_attempt`].
pub fn retry<T, E, F>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mut unit: F,
) -> Result<T, RetryError<E>>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Attempt<T, E>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            sleeper.sleep(config.delay_for_attempt(attempt));
        }

        match unit(attempt) {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fatal(err) => return Err(RetryError::Fatal(err)),
            Attempt::Retryable(err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    warn!(attempts = attempt, error = %err, "Retry budget exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                debug!(attempt, error = %err, "Retrying after conflict");
            }
        }
    }
}
