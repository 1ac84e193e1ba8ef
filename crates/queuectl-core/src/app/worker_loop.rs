//! WorkerLoop - claim, execute, resolve.
//!
//! # Flow
//! 1. `JobStore::claim_next_pending()`; nothing to claim means sleep one poll interval
//! 2. `CommandExecutor::execute()` → `Outcome`
//! 3. `RetryPolicy::decide()` → `Decision`
//! 4. write the decision back through the store
//! 5. for a retry, wait out the backoff with the job in `failed`, then
//!    return it to `pending`
//!
//! Once a job is claimed, steps 4 and 5 retry their store writes until they
//! succeed, so an unreachable database stalls the worker instead of losing
//! the job.
//!
//! Shutdown is cooperative: the stop signal is checked between iterations
//! and cuts idle sleeps short, but a running command and a backoff wait
//! always finish first.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::{Decision, Job, JobId, Outcome};
use crate::error::QueueError;
use crate::ports::{CommandExecutor, JobStore, QueueSettings, SettingsProvider};

/// Pause after an iteration fails before trying again.
pub const DEFAULT_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// What one iteration did.
#[derive(Debug, Clone, PartialEq)]
pub enum Iteration {
    /// Nothing was pending.
    Idle,
    Completed(JobId),
    /// Failed, waited `delay`, and was returned to pending.
    Retried {
        id: JobId,
        attempts: u32,
        delay: Duration,
    },
    DeadLettered {
        id: JobId,
        attempts: u32,
    },
    /// The job left `processing` while it ran, so its failure was not recorded.
    Lost(JobId),
}

/// A write that settles a claimed job.
#[derive(Debug, Clone, Copy)]
enum Transition {
    Complete,
    Fail { attempts: u32 },
    Bury { attempts: u32 },
    Release { attempts: u32 },
}

impl Transition {
    fn name(self) -> &'static str {
        match self {
            Transition::Complete => "mark_completed",
            Transition::Fail { .. } => "mark_retryable_failure",
            Transition::Bury { .. } => "mark_dead",
            Transition::Release { .. } => "return_to_pending",
        }
    }
}

pub struct WorkerLoop {
    id: usize,
    store: Arc<dyn JobStore>,
    executor: Arc<dyn CommandExecutor>,
    settings: Arc<dyn SettingsProvider>,
    error_pause: Duration,
}

impl WorkerLoop {
    pub fn new(
        id: usize,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn CommandExecutor>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            id,
            store,
            executor,
            settings,
            error_pause: DEFAULT_ERROR_PAUSE,
        }
    }

    pub fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    /// Run a single iteration against the current settings, including any
    /// backoff wait. Does not sleep when idle.
    pub async fn tick(&self) -> Result<Iteration, QueueError> {
        let settings = self.settings.current();
        self.iterate(&settings).await
    }

    /// Loop until `shutdown` turns true (or its sender is dropped).
    ///
    /// Errors and panics inside an iteration are logged and followed by a
    /// short pause; they never end the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = self.id, "worker started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let settings = self.settings.current();
            let result = AssertUnwindSafe(self.iterate(&settings))
                .catch_unwind()
                .await;

            let pause = match result {
                Ok(Ok(Iteration::Idle)) => Some(settings.poll_interval()),
                Ok(Ok(_)) => None,
                Ok(Err(err)) => {
                    error!(worker = self.id, error = %err, "iteration failed");
                    Some(self.error_pause)
                }
                Err(panic) => {
                    error!(
                        worker = self.id,
                        panic = panic_message(panic.as_ref()),
                        "iteration panicked"
                    );
                    Some(self.error_pause)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        info!(worker = self.id, "worker stopped");
    }

    async fn iterate(&self, settings: &QueueSettings) -> Result<Iteration, QueueError> {
        let Some(mut job) = self.store.claim_next_pending().await? else {
            return Ok(Iteration::Idle);
        };

        info!(
            worker = self.id,
            job_id = %job.id,
            command = %job.command,
            attempts = job.attempts,
            "claimed job"
        );

        let outcome = self.execute(&job).await;
        let decision = settings
            .retry_policy()
            .decide(job.attempts, job.max_retries, &outcome);

        match decision {
            Decision::Complete => {
                let rows = self.settle(&job.id, Transition::Complete).await;
                self.expect_one(rows, &job.id, Transition::Complete);
                info!(worker = self.id, job_id = %job.id, "job completed");
                Ok(Iteration::Completed(job.id))
            }
            Decision::DeadLetter { attempts } => {
                let bury = Transition::Bury { attempts };
                let rows = self.settle(&job.id, bury).await;
                self.expect_one(rows, &job.id, bury);
                warn!(
                    worker = self.id,
                    job_id = %job.id,
                    attempts,
                    reason = outcome.reason.as_deref().unwrap_or(""),
                    "retries exhausted, moved to dead letter queue"
                );
                Ok(Iteration::DeadLettered {
                    id: job.id,
                    attempts,
                })
            }
            Decision::RetryAfter { attempts, delay } => {
                let fail = Transition::Fail { attempts };
                let rows = self.settle(&job.id, fail).await;
                if !self.expect_one(rows, &job.id, fail) {
                    return Ok(Iteration::Lost(job.id));
                }
                job.attempts = attempts;
                warn!(
                    worker = self.id,
                    job_id = %job.id,
                    attempts,
                    retries_left = job.retries_left(),
                    delay_secs = delay.as_secs_f64(),
                    reason = outcome.reason.as_deref().unwrap_or(""),
                    "job failed, retry scheduled"
                );

                // The job sits in `failed` here, invisible to every worker.
                tokio::time::sleep(delay).await;

                let release = Transition::Release { attempts };
                let rows = self.settle(&job.id, release).await;
                self.expect_one(rows, &job.id, release);
                Ok(Iteration::Retried {
                    id: job.id,
                    attempts,
                    delay,
                })
            }
        }
    }

    /// Apply `transition`, retrying every `error_pause` until the store
    /// accepts the write. A claimed job is never left behind in
    /// `processing` or `failed` because of a transient store error.
    async fn settle(&self, id: &JobId, transition: Transition) -> u64 {
        loop {
            match self.write(id, transition).await {
                Ok(rows) => return rows,
                Err(err) => {
                    error!(
                        worker = self.id,
                        job_id = %id,
                        transition = transition.name(),
                        error = %err,
                        "store write failed, retrying"
                    );
                    tokio::time::sleep(self.error_pause).await;
                }
            }
        }
    }

    async fn write(&self, id: &JobId, transition: Transition) -> Result<u64, QueueError> {
        match transition {
            Transition::Complete => self.store.mark_completed(id).await,
            Transition::Fail { attempts } => self.store.mark_retryable_failure(id, attempts).await,
            Transition::Bury { attempts } => self.store.mark_dead(id, attempts).await,
            Transition::Release { attempts } => self.store.return_to_pending(id, attempts).await,
        }
    }

    /// A panicking executor counts as a failed execution.
    async fn execute(&self, job: &Job) -> Outcome {
        match AssertUnwindSafe(self.executor.execute(&job.command))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(worker = self.id, job_id = %job.id, panic = message, "executor panicked");
                Outcome::failure(format!("executor panicked: {message}"))
            }
        }
    }

    fn expect_one(&self, rows: u64, id: &JobId, transition: Transition) -> bool {
        if rows == 0 {
            warn!(
                worker = self.id,
                job_id = %id,
                transition = transition.name(),
                "transition affected no rows"
            );
            return false;
        }
        true
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
