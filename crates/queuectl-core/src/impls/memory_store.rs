//! In-memory job store.
//!
//! Not durable. Used by tests and by embedders that do not need persistence.
//! Every operation runs inside one critical section of the state mutex, which
//! makes each transition atomic with respect to other workers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{Job, JobId, JobState};
use crate::error::QueueError;
use crate::observability::StateCounts;
use crate::ports::{Clock, JobStore, SystemClock};

struct Entry {
    job: Job,
    /// Insertion order. Breaks ties between jobs created in the same instant.
    seq: u64,
}

struct InMemoryJobStoreState {
    jobs: HashMap<JobId, Entry>,

    /// Pending jobs, oldest first.
    pending: BTreeMap<(DateTime<Utc>, u64), JobId>,

    next_seq: u64,
}

impl InMemoryJobStoreState {
    fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            pending: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn insert(&mut self, job: Job) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if job.state == JobState::Pending {
            self.pending.insert((job.created_at, seq), job.id.clone());
        }
        self.jobs.insert(job.id.clone(), Entry { job, seq });
    }

    /// Conditional transition. Returns the number of jobs changed (0 or 1).
    fn transition(
        &mut self,
        id: &JobId,
        from: JobState,
        to: JobState,
        attempts: Option<u32>,
        now: DateTime<Utc>,
    ) -> u64 {
        let Some(entry) = self.jobs.get_mut(id) else {
            return 0;
        };
        if entry.job.state != from {
            return 0;
        }

        let key = (entry.job.created_at, entry.seq);
        if from == JobState::Pending {
            self.pending.remove(&key);
        }
        if to == JobState::Pending {
            self.pending.insert(key, id.clone());
        }

        entry.job.state = to;
        if let Some(attempts) = attempts {
            entry.job.attempts = attempts;
        }
        entry.job.updated_at = now;
        1
    }
}

pub struct InMemoryJobStore {
    state: Mutex<InMemoryJobStoreState>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(InMemoryJobStoreState::new()),
            clock,
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        if job.command.trim().is_empty() {
            return Err(QueueError::InvalidJob("command must not be empty".to_string()));
        }

        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            return Err(QueueError::DuplicateId(job.id));
        }
        state.insert(job);
        Ok(())
    }

    async fn claim_next_pending(&self) -> Result<Option<Job>, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let Some(id) = state.pending.values().next().cloned() else {
            return Ok(None);
        };
        if state.transition(&id, JobState::Pending, JobState::Processing, None, now) == 0 {
            return Ok(None);
        }
        Ok(state.jobs.get(&id).map(|entry| entry.job.clone()))
    }

    async fn mark_completed(&self, id: &JobId) -> Result<u64, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.transition(id, JobState::Processing, JobState::Completed, None, now))
    }

    async fn mark_retryable_failure(&self, id: &JobId, attempts: u32) -> Result<u64, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.transition(
            id,
            JobState::Processing,
            JobState::Failed,
            Some(attempts),
            now,
        ))
    }

    async fn mark_dead(&self, id: &JobId, attempts: u32) -> Result<u64, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.transition(
            id,
            JobState::Processing,
            JobState::Dead,
            Some(attempts),
            now,
        ))
    }

    async fn return_to_pending(&self, id: &JobId, attempts: u32) -> Result<u64, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.transition(
            id,
            JobState::Failed,
            JobState::Pending,
            Some(attempts),
            now,
        ))
    }

    async fn requeue_from_dlq(&self, id: &JobId) -> Result<Job, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let current = match state.jobs.get(id) {
            Some(entry) => entry.job.state,
            None => return Err(QueueError::NotFound(id.clone())),
        };
        if state.transition(id, JobState::Dead, JobState::Pending, Some(0), now) == 0 {
            return Err(QueueError::NotInDlq {
                id: id.clone(),
                state: current,
            });
        }
        state
            .jobs
            .get(id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| QueueError::NotFound(id.clone()))
    }

    async fn recover_orphans(&self) -> Result<u64, QueueError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let orphans: Vec<(JobId, JobState)> = state
            .jobs
            .values()
            .filter(|entry| matches!(entry.job.state, JobState::Processing | JobState::Failed))
            .map(|entry| (entry.job.id.clone(), entry.job.state))
            .collect();

        let mut moved = 0;
        for (id, from) in orphans {
            moved += state.transition(&id, from, JobState::Pending, None, now);
        }
        Ok(moved)
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(id).map(|entry| entry.job.clone()))
    }

    async fn list(&self, filter: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        let state = self.state.lock().await;
        let mut entries: Vec<&Entry> = state
            .jobs
            .values()
            .filter(|entry| filter.is_none_or(|s| entry.job.state == s))
            .collect();
        entries.sort_by(|a, b| (b.job.created_at, b.seq).cmp(&(a.job.created_at, a.seq)));
        Ok(entries.into_iter().map(|entry| entry.job.clone()).collect())
    }

    async fn summary(&self) -> Result<StateCounts, QueueError> {
        let state = self.state.lock().await;
        let mut counts = StateCounts::default();
        for entry in state.jobs.values() {
            counts.add(entry.job.state, 1);
        }
        Ok(counts)
    }
}
