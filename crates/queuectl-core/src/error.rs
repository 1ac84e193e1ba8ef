use thiserror::Error;

use crate::domain::{JobId, JobState};

/// Errors surfaced by the queue core.
///
/// Two conditions are deliberately absent:
/// - a lost claim race is reported as `Ok(None)` from `JobStore::claim_next_pending`;
/// - a failed command is an `Outcome`, which only feeds the retry policy.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("job {0} already exists")]
    DuplicateId(JobId),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {id} is not in the dead letter queue (state: {state})")]
    NotInDlq { id: JobId, state: JobState },

    #[error("worker pool is already running")]
    AlreadyRunning,

    #[error("worker pool is not running")]
    NotRunning,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("corrupt job record: {0}")]
    CorruptRecord(String),

    #[error("control channel error: {0}")]
    Control(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
