//! Domain model (ids, jobs, requests, outcomes, decisions, retry policy).
//!
//! Nothing in here performs I/O. Persistence and execution live behind the
//! traits in `ports`.

pub mod decision;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod request;
pub mod retry;
pub mod state;

pub use decision::Decision;
pub use ids::JobId;
pub use job::Job;
pub use outcome::{Outcome, OutcomeKind};
pub use request::JobRequest;
pub use retry::RetryPolicy;
pub use state::JobState;
