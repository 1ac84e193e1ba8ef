//! Outcome model: the result of running a job's command once.
//!
//! An outcome only feeds the retry decision. It is never an error value:
//! a command that exits non-zero or cannot be spawned is a normal failure.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Result of one execution.
///
/// - `SUCCESS`: exit code 0.
/// - `FAILURE`: non-zero exit, killed by a signal, or the shell could not be spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            kind: OutcomeKind::Success,
            exit_code: Some(0),
            reason: None,
        }
    }

    /// The command ran and exited with a non-zero code.
    pub fn exit_failure(code: i32) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            exit_code: Some(code),
            reason: Some(format!("exited with code {code}")),
        }
    }

    /// Failure with no exit code (signal, timeout, ...).
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            exit_code: None,
            reason: Some(reason.into()),
        }
    }

    /// The shell itself could not be started.
    pub fn spawn_failure(err: &std::io::Error) -> Self {
        Self::failure(format!("failed to spawn shell: {err}"))
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}
