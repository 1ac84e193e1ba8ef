//! Retry policy: decides backoff delays and when to give up.

use std::time::Duration;

use super::decision::Decision;
use super::outcome::Outcome;

/// Exponential backoff policy.
///
/// The delay after the n-th failure is `backoff_base ^ n` seconds. With the
/// default base of 2: 2s, 4s, 8s, ...
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub backoff_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { backoff_base: 2.0 }
    }
}

impl RetryPolicy {
    pub fn new(backoff_base: f64) -> Self {
        Self { backoff_base }
    }

    /// Delay before retrying a job that has now failed `attempts` times.
    ///
    /// Saturates to `Duration::MAX` when the result does not fit a `Duration`.
    pub fn delay(&self, attempts: u32) -> Duration {
        let secs = self.backoff_base.powf(f64::from(attempts));
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Decide the next action for a job that had `attempts` failures before
    /// this execution and allows `max_retries` retries.
    pub fn decide(&self, attempts: u32, max_retries: u32, outcome: &Outcome) -> Decision {
        if outcome.is_success() {
            return Decision::Complete;
        }

        let attempts = attempts.saturating_add(1);
        if attempts > max_retries {
            Decision::DeadLetter { attempts }
        } else {
            Decision::RetryAfter {
                attempts,
                delay: self.delay(attempts),
            }
        }
    }
}
