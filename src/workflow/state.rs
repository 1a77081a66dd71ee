use serde::Serialize;
use strum::Display;

use crate::models::job::JobId;

/// Why a run ended in [`WorkflowState::Failed`].
#[derive(Debug, Clone, Copy, Serialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// The request never left the client.
    InvalidRequest,
    /// Job creation failed (network or non-403 error).
    Submission,
    /// The status endpoint kept answering 404.
    NotFound,
    /// The backend reported the job as failed.
    Reported,
    /// A status request failed outright.
    Unreachable,
    /// The job id could not be persisted.
    Storage,
}

/// Lifecycle of one submit/poll run.
///
/// ```text
/// Idle -> Submitting -> Polling -> Succeeded | Failed | TimedOut
///             |            |
///             |            +-> Cancelled | Superseded
///             +-> QuotaExceeded | Failed | Cancelled
/// ```
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Submitting,
    Polling {
        job_id: JobId,
        attempt: u32,
    },
    Succeeded {
        job_id: JobId,
        result_url: String,
    },
    Failed {
        job_id: Option<JobId>,
        kind: FailureKind,
        message: String,
    },
    TimedOut {
        job_id: JobId,
        attempts: u32,
    },
    QuotaExceeded,
    Cancelled {
        job_id: Option<JobId>,
    },
    /// A newer job took over the session; this run stopped silently.
    Superseded {
        job_id: JobId,
    },
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            WorkflowState::Idle | WorkflowState::Submitting | WorkflowState::Polling { .. }
        )
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            WorkflowState::Polling { job_id, .. }
            | WorkflowState::Succeeded { job_id, .. }
            | WorkflowState::TimedOut { job_id, .. }
            | WorkflowState::Superseded { job_id } => Some(job_id),
            WorkflowState::Failed { job_id, .. } | WorkflowState::Cancelled { job_id } => {
                job_id.as_ref()
            }
            WorkflowState::Idle | WorkflowState::Submitting | WorkflowState::QuotaExceeded => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Submitting => "submitting",
            WorkflowState::Polling { .. } => "polling",
            WorkflowState::Succeeded { .. } => "succeeded",
            WorkflowState::Failed { .. } => "failed",
            WorkflowState::TimedOut { .. } => "timed_out",
            WorkflowState::QuotaExceeded => "quota_exceeded",
            WorkflowState::Cancelled { .. } => "cancelled",
            WorkflowState::Superseded { .. } => "superseded",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Any state may restart into `Submitting` ("try another style");
    /// terminal states otherwise go nowhere.
    pub fn can_transition_to(&self, next: &WorkflowState) -> bool {
        use WorkflowState::*;

        match (self, next) {
            (_, Submitting) => true,
            (Submitting, Polling { .. })
            | (Submitting, QuotaExceeded)
            | (Submitting, Failed { .. })
            | (Submitting, Cancelled { .. }) => true,
            (Idle, Polling { .. }) => true,
            (Polling { job_id: a, .. }, Polling { job_id: b, .. }) => a == b,
            (Polling { .. }, Succeeded { .. })
            | (Polling { .. }, Failed { .. })
            | (Polling { .. }, TimedOut { .. })
            | (Polling { .. }, Cancelled { .. })
            | (Polling { .. }, Superseded { .. }) => true,
            _ => false,
        }
    }
}
