//! Enqueue requests.
//!
//! A request is what a client hands to the queue; it becomes a `Job` only after
//! the queue has filled in an id, a retry limit and timestamps.

use serde::Deserialize;

use super::ids::JobId;
use crate::error::QueueError;

/// A validated request to enqueue one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub command: String,
    pub id: Option<JobId>,
    pub max_retries: Option<u32>,
}

/// Wire shape accepted by `JobRequest::from_json`. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct RawJobRequest {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    command: Option<serde_json::Value>,
    #[serde(default)]
    max_retries: Option<serde_json::Value>,
}

impl JobRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            id: None,
            max_retries: None,
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Parse a JSON object such as `{"id":"job1","command":"sleep 2","max_retries":3}`.
    ///
    /// Only `command` is required. `null` counts as absent for the optional fields.
    pub fn from_json(input: &str) -> Result<Self, QueueError> {
        let raw: RawJobRequest = serde_json::from_str(input)
            .map_err(|e| QueueError::InvalidJob(format!("malformed job JSON: {e}")))?;

        let command = match raw.command {
            Some(serde_json::Value::String(command)) => command,
            Some(serde_json::Value::Null) | None => {
                return Err(QueueError::InvalidJob("missing field 'command'".to_string()));
            }
            Some(other) => {
                return Err(QueueError::InvalidJob(format!(
                    "field 'command' must be a string, got {other}"
                )));
            }
        };

        let id = match raw.id {
            Some(serde_json::Value::String(id)) => Some(JobId::parse(id)?),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => {
                return Err(QueueError::InvalidJob(format!(
                    "field 'id' must be a string, got {other}"
                )));
            }
        };

        let max_retries = match raw.max_retries {
            Some(serde_json::Value::Number(n)) => {
                let value = n.as_u64().and_then(|v| u32::try_from(v).ok()).ok_or_else(|| {
                    QueueError::InvalidJob(format!(
                        "field 'max_retries' must be a non-negative integer, got {n}"
                    ))
                })?;
                Some(value)
            }
            Some(serde_json::Value::Null) | None => None,
            Some(other) => {
                return Err(QueueError::InvalidJob(format!(
                    "field 'max_retries' must be a non-negative integer, got {other}"
                )));
            }
        };

        let request = Self {
            command,
            id,
            max_retries,
        };
        request.validate()?;
        Ok(request)
    }

    /// Reject requests that can never run.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.command.trim().is_empty() {
            return Err(QueueError::InvalidJob("command must not be empty".to_string()));
        }
        Ok(())
    }
}
