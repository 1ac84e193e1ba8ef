//! CommandExecutor port.

use async_trait::async_trait;

use crate::domain::Outcome;

/// Runs one job's command to completion.
///
/// Never returns an error: a command that cannot be started is a failed
/// `Outcome` like any non-zero exit.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Outcome;
}
