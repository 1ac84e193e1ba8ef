//! Decision model: what happens to a job after an execution.

use std::time::Duration;

/// The next action for a job that just finished running.
///
/// Deciding is pure; applying the decision to the store is the worker's job.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Exit code 0. The job is done.
    Complete,

    /// Record the failure, wait `delay`, then return the job to pending.
    RetryAfter { attempts: u32, delay: Duration },

    /// Retries exhausted. Move the job to the dead letter queue.
    DeadLetter { attempts: u32 },
}
