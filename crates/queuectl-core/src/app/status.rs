//! Status - what a worker pool reports about itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub running: bool,

    /// Process hosting the pool.
    pub pid: u32,

    /// Configured worker count; 0 when stopped.
    pub workers: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl PoolStatus {
    pub fn stopped() -> Self {
        Self {
            running: false,
            pid: std::process::id(),
            workers: 0,
            started_at: None,
        }
    }
}
