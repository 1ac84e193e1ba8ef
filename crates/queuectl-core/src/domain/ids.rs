//! Job identifiers.
//!
//! Clients may name their own jobs, so a `JobId` is an opaque string rather
//! than a parsed ULID. Ids generated by the queue itself are ULIDs (see
//! `ports::id_generator`), which keeps them unique without coordination and
//! lexicographically sortable by creation time.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::QueueError;

/// Identifier of a job. Immutable and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Accept a caller supplied id. Blank ids are rejected.
    pub fn parse(value: impl Into<String>) -> Result<Self, QueueError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(QueueError::InvalidJob("job id must not be empty".to_string()));
        }
        Ok(Self(value))
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_ids_are_rejected() {
        assert!(matches!(JobId::parse(""), Err(QueueError::InvalidJob(_))));
        assert!(matches!(JobId::parse("   "), Err(QueueError::InvalidJob(_))));
    }

    #[test]
    fn caller_ids_are_kept_verbatim() {
        let id = JobId::parse("nightly-report").unwrap();
        assert_eq!(id.as_str(), "nightly-report");
        assert_eq!(id.to_string(), "nightly-report");
    }

    #[test]
    fn ulid_ids_sort_by_creation() {
        let first = JobId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = JobId::from_ulid(Ulid::new());
        assert!(first < second);
    }

    #[test]
    fn serializes_as_a_plain_string() {
        let id = JobId::parse("job-1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"job-1\"");
        let back: JobId = serde_json::from_str("\"job-1\"").unwrap();
        assert_eq!(back, id);
    }
}
