//! queuectl-core
//!
//! A durable job queue for shell commands: clients enqueue jobs, a pool of
//! workers claims and runs them, failures are retried with exponential
//! backoff, and jobs that run out of retries land in a dead letter queue.
//!
//! # Modules
//! - **domain**: jobs, states, requests, outcomes, decisions, retry policy
//! - **ports**: traits at the edges (JobStore, CommandExecutor, SettingsProvider, Clock, IdGenerator)
//! - **impls**: SQLite and in-memory stores, shell executor, file settings
//! - **app**: worker loop, worker pool, submission facade, control channel
//! - **error**: `QueueError`
//! - **observability**: per-state counts and tracing setup

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{App, AppBuilder, JobQueue, PoolStatus, WorkerPool};
pub use domain::{Job, JobId, JobRequest, JobState};
pub use error::QueueError;
pub use observability::StateCounts;
