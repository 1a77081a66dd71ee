use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Opaque job identifier assigned by the backend on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
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

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Status of a try-on or recommendation job as reported by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum JobStatus {
    Pending,
    #[serde(alias = "succeed", alias = "success")]
    #[strum(to_string = "succeeded", serialize = "succeed", serialize = "success")]
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Parse a wire status. Anything unrecognised is still in progress.
    pub fn from_wire(raw: &str) -> Self {
        JobStatus::from_str(raw.trim()).unwrap_or_else(|_| {
            tracing::debug!(status = raw, "Unrecognised job status, treating as pending");
            JobStatus::Pending
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Snapshot of a job, replaced wholesale by every status fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

impl Job {
    pub fn pending(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            result_url: None,
            error_message: None,
        }
    }

    pub fn succeeded(id: JobId, result_url: impl Into<String>) -> Self {
        Self {
            id,
            status: JobStatus::Succeeded,
            result_url: Some(result_url.into()),
            error_message: None,
        }
    }

    pub fn failed(id: JobId, error_message: Option<String>) -> Self {
        Self {
            id,
            status: JobStatus::Failed,
            result_url: None,
            error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_status_aliases() {
        assert_eq!(JobStatus::from_wire("succeed"), JobStatus::Succeeded);
        assert_eq!(JobStatus::from_wire("SUCCEEDED"), JobStatus::Succeeded);
        assert_eq!(JobStatus::from_wire("success"), JobStatus::Succeeded);
        assert_eq!(JobStatus::from_wire("failed"), JobStatus::Failed);
        assert_eq!(JobStatus::from_wire("pending"), JobStatus::Pending);
    }

    #[test]
    fn test_unknown_status_is_pending() {
        assert_eq!(JobStatus::from_wire("processing"), JobStatus::Pending);
        assert_eq!(JobStatus::from_wire(""), JobStatus::Pending);
    }

    #[test]
    fn test_display_uses_canonical_name() {
        assert_eq!(JobStatus::Succeeded.to_string(), "succeeded");
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn test_serde_accepts_backend_spelling() {
        let status: JobStatus = serde_json::from_str("\"succeed\"").unwrap();
        assert_eq!(status, JobStatus::Succeeded);
    }
}
