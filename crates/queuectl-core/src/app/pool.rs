//! WorkerPool - owns a set of worker loops and their shutdown signal.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::status::PoolStatus;
use super::worker_loop::{DEFAULT_ERROR_PAUSE, WorkerLoop};
use crate::error::QueueError;
use crate::ports::{Clock, CommandExecutor, JobStore, SettingsProvider, SystemClock};

/// Handles of a started pool.
/// - sending `true` on `shutdown_tx` (or dropping it) stops every loop
/// - `joins` lets `stop()` wait for all of them
struct RunningPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    workers: usize,
    started_at: DateTime<Utc>,
}

impl RunningPool {
    async fn shutdown_and_join(self) {
        // ignore send error: every loop may already be gone
        let _ = self.shutdown_tx.send(true);
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

/// A fixed-size pool of `WorkerLoop`s sharing one store.
///
/// `start` returns as soon as the loops are spawned. `stop` waits for each
/// loop to finish its current iteration, so no job is abandoned mid-run.
/// Dropping a running pool signals the loops to stop without waiting.
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    executor: Arc<dyn CommandExecutor>,
    settings: Arc<dyn SettingsProvider>,
    clock: Arc<dyn Clock>,
    error_pause: Duration,
    running: Mutex<Option<RunningPool>>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<dyn CommandExecutor>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            store,
            executor,
            settings,
            clock: Arc::new(SystemClock),
            error_pause: DEFAULT_ERROR_PAUSE,
            running: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    /// Spawn `workers` loops on the current tokio runtime.
    pub fn start(&self, workers: usize) -> Result<PoolStatus, QueueError> {
        if workers == 0 {
            return Err(QueueError::Config(
                "worker count must be at least 1".to_string(),
            ));
        }

        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(QueueError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut joins = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let worker = WorkerLoop::new(
                worker_id,
                Arc::clone(&self.store),
                Arc::clone(&self.executor),
                Arc::clone(&self.settings),
            )
            .with_error_pause(self.error_pause);
            joins.push(tokio::spawn(worker.run(shutdown_rx.clone())));
        }

        let started_at = self.clock.now();
        *running = Some(RunningPool {
            shutdown_tx,
            joins,
            workers,
            started_at,
        });

        info!(workers, "worker pool started");
        Ok(Self::running_status(workers, started_at))
    }

    /// Signal every loop to stop and wait for all of them.
    pub async fn stop(&self) -> Result<(), QueueError> {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(QueueError::NotRunning)?;

        let workers = running.workers;
        info!(workers, "stopping worker pool");
        running.shutdown_and_join().await;
        info!(workers, "worker pool stopped");
        Ok(())
    }

    pub fn status(&self) -> PoolStatus {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        match running.as_ref() {
            Some(pool) => Self::running_status(pool.workers, pool.started_at),
            None => PoolStatus::stopped(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn running_status(workers: usize, started_at: DateTime<Utc>) -> PoolStatus {
        PoolStatus {
            running: true,
            pid: std::process::id(),
            workers,
            started_at: Some(started_at),
        }
    }
}
