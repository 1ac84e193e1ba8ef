//! JobQueue - submission and inspection boundary.
//!
//! Turns client requests into jobs (id, retry limit, timestamps) and exposes
//! the read side of the store to operators.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{Job, JobId, JobRequest, JobState};
use crate::error::QueueError;
use crate::observability::StateCounts;
use crate::ports::{
    Clock, IdGenerator, JobStore, SettingsProvider, SystemClock, UlidGenerator,
};

pub struct JobQueue {
    store: Arc<dyn JobStore>,
    settings: Arc<dyn SettingsProvider>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, settings: Arc<dyn SettingsProvider>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            store,
            settings,
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Persist a new pending job for `request`.
    ///
    /// Missing id → generated ULID; missing `max_retries` → current setting.
    pub async fn submit(&self, request: JobRequest) -> Result<Job, QueueError> {
        request.validate()?;

        let id = match request.id {
            Some(id) => id,
            None => self.ids.generate(),
        };
        let max_retries = request
            .max_retries
            .unwrap_or_else(|| self.settings.current().max_retries);

        let job = Job::new(id, request.command, max_retries, self.clock.now());
        self.store.enqueue(job.clone()).await?;

        info!(job_id = %job.id, command = %job.command, max_retries, "job enqueued");
        Ok(job)
    }

    /// Parse a JSON job description and submit it. Nothing is stored when
    /// the description is rejected.
    pub async fn submit_json(&self, raw: &str) -> Result<Job, QueueError> {
        let request = JobRequest::from_json(raw)?;
        self.submit(request).await
    }

    pub async fn get(&self, id: &JobId) -> Result<Option<Job>, QueueError> {
        self.store.get(id).await
    }

    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        self.store.list(state).await
    }

    pub async fn summary(&self) -> Result<StateCounts, QueueError> {
        self.store.summary().await
    }

    pub async fn dead_letters(&self) -> Result<Vec<Job>, QueueError> {
        self.store.list(Some(JobState::Dead)).await
    }

    /// Requeue jobs abandoned in `processing` or `failed` by a pool that did
    /// not shut down cleanly. Call before starting a pool, never while one
    /// is running.
    pub async fn recover_orphans(&self) -> Result<u64, QueueError> {
        let recovered = self.store.recover_orphans().await?;
        if recovered > 0 {
            warn!(recovered, "requeued jobs left in flight by a previous pool");
        }
        Ok(recovered)
    }

    /// Move a dead job back to pending with attempts reset.
    pub async fn retry_dead(&self, id: &JobId) -> Result<Job, QueueError> {
        let job = self.store.requeue_from_dlq(id).await?;
        info!(job_id = %job.id, "job requeued from dead letter queue");
        Ok(job)
    }
}
