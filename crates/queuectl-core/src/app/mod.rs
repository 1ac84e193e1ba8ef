//! App - application layer.
//!
//! Combines the ports into the running system.
//!
//! # Components
//! - **WorkerLoop**: claim → execute → decide → resolve, one job at a time
//! - **WorkerPool**: N worker loops with a shared shutdown signal
//! - **JobQueue**: submission and inspection boundary
//! - **AppBuilder**: opens a data directory and wires the pieces together
//! - **control**: Unix-socket control channel for a running pool

pub mod builder;
#[cfg(unix)]
pub mod control;
pub mod pool;
pub mod queue;
pub mod status;
pub mod worker_loop;

pub use self::builder::{App, AppBuilder};
#[cfg(unix)]
pub use self::control::{ControlRequest, ControlResponse, ControlServer};
pub use self::pool::WorkerPool;
pub use self::queue::JobQueue;
pub use self::status::PoolStatus;
pub use self::worker_loop::{Iteration, WorkerLoop};
