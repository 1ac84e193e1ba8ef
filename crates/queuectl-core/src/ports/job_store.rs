//! JobStore port - the source of truth for jobs.
//!
//! The store owns every state transition. Each write is a single conditional
//! transition: it only applies when the job is in the expected state, and it
//! reports how many rows it touched (0 or 1) instead of failing. Callers must
//! check that count.
//!
//! | Operation                  | Requires     | Writes                     |
//! |----------------------------|--------------|----------------------------|
//! | `claim_next_pending`       | `pending`    | `processing`               |
//! | `mark_completed`           | `processing` | `completed`                |
//! | `mark_retryable_failure`   | `processing` | `failed`, attempts = n     |
//! | `mark_dead`                | `processing` | `dead`, attempts = n       |
//! | `return_to_pending`        | `failed`     | `pending`, attempts = n    |
//! | `requeue_from_dlq`         | `dead`       | `pending`, attempts = 0    |
//! | `recover_orphans`          | `processing` or `failed` | `pending`, attempts kept |
//!
//! Every write stamps `updated_at`.

use async_trait::async_trait;

use crate::domain::{Job, JobId, JobState};
use crate::error::QueueError;
use crate::observability::StateCounts;

/// # Design
/// - every transition is a single conditional update, the claim included
/// - the SQLite implementation can be shared between processes
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. The job is stored as given, so callers build it
    /// with `Job::new`.
    ///
    /// Fails with `InvalidJob` for an empty command and `DuplicateId` when
    /// the id is taken.
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;

    /// Atomically move the oldest pending job to `processing` and return it.
    ///
    /// If two callers race for the same job, at most one gets it; the other
    /// sees a different job or `None`.
    async fn claim_next_pending(&self) -> Result<Option<Job>, QueueError>;

    async fn mark_completed(&self, id: &JobId) -> Result<u64, QueueError>;

    async fn mark_retryable_failure(&self, id: &JobId, attempts: u32) -> Result<u64, QueueError>;

    async fn mark_dead(&self, id: &JobId, attempts: u32) -> Result<u64, QueueError>;

    /// Return a `failed` job to `pending` once its backoff has elapsed.
    async fn return_to_pending(&self, id: &JobId, attempts: u32) -> Result<u64, QueueError>;

    /// Move a dead job back to `pending` with attempts reset to 0.
    ///
    /// `NotFound` for an unknown id, `NotInDlq` when the job is not dead.
    async fn requeue_from_dlq(&self, id: &JobId) -> Result<Job, QueueError>;

    /// Return every `processing` or `failed` job to `pending`, keeping its
    /// attempts. Returns how many jobs moved.
    ///
    /// Only safe while no worker pool is running on this store: it is meant
    /// for jobs abandoned by a pool that crashed or was killed.
    async fn recover_orphans(&self) -> Result<u64, QueueError>;

    async fn get(&self, id: &JobId) -> Result<Option<Job>, QueueError>;

    /// Jobs ordered newest-created first, optionally filtered by state.
    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError>;

    async fn summary(&self) -> Result<StateCounts, QueueError>;
}
