//! Job lifecycle states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Job state.
///
/// # Transitions
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Failed -> Pending (after the backoff, until attempts > max_retries)
/// - Pending -> Processing -> Dead
/// - Dead -> Pending (manual requeue, attempts reset to 0)
/// - Processing | Failed -> Pending (orphan recovery before a pool starts, attempts kept)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed.
    Pending,

    /// Claimed by exactly one worker.
    Processing,

    /// Finished with exit code 0.
    Completed,

    /// Failed, waiting out its backoff before returning to pending.
    Failed,

    /// Retries exhausted. Lives in the dead letter queue.
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| QueueError::InvalidJob(format!("unknown job state '{s}'")))
    }
}
