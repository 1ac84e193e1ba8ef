//! Job record.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::state::JobState;

/// A job as persisted by a `JobStore`.
///
/// Design:
/// - The store is the single source of truth; a `Job` in memory is a snapshot.
/// - `id` and `command` never change after creation.
/// - `attempts` counts failed executions so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A fresh job in `Pending` with no failed attempts.
    ///
    /// Timestamps are kept to microseconds, the precision stores persist.
    pub fn new(
        id: JobId,
        command: impl Into<String>,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let now = now.trunc_subsecs(6);
        Self {
            id,
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at: now,
            updated_at: now,
        }
    }

    /// Retryable failures left before the next failure dead-letters the job.
    pub fn retries_left(&self) -> u32 {
        self.max_retries.saturating_sub(self.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn new_job_starts_pending_with_zero_attempts() {
        let job = Job::new(JobId::parse("a").unwrap(), "echo hi", 3, at(10));
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn timestamps_are_truncated_to_microseconds() {
        let precise = Utc.timestamp_opt(10, 123_456_789).unwrap();
        let job = Job::new(JobId::parse("a").unwrap(), "true", 0, precise);
        assert_eq!(job.created_at.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(job.updated_at, job.created_at);
    }

    #[test]
    fn retries_left_never_underflows() {
        let mut job = Job::new(JobId::parse("a").unwrap(), "false", 2, at(10));
        assert_eq!(job.retries_left(), 2);
        job.attempts = 3;
        assert_eq!(job.retries_left(), 0);
    }
}
