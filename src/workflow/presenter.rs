use serde::Serialize;
use strum::Display;
use tokio::sync::watch;

use crate::models::job::JobId;
use crate::workflow::state::{FailureKind, WorkflowState};

pub const SUBMISSION_FAILED: &str = "We couldn't start your try-on. Please try again.";
pub const JOB_FAILED: &str = "Try-on failed. Please try again.";
pub const TIMED_OUT: &str = "Try-on is taking too long. Please try again.";
pub const NOT_FOUND: &str = "We couldn't find your try-on. Please try again.";
pub const UNREACHABLE: &str = "Network error while checking try-on status.";
pub const INVALID_REQUEST: &str = "Please upload both a photo of yourself and the apparel.";

/// Controls offered alongside a view.
#[derive(Debug, Clone, Copy, Serialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Download,
    TryAnother,
    Continue,
    Back,
    Upgrade,
}

/// What the user should be looking at.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum Presentation {
    Idle,
    Generating {
        job_id: Option<JobId>,
    },
    Success {
        job_id: JobId,
        result_url: String,
        actions: Vec<Action>,
    },
    Failure {
        message: String,
        actions: Vec<Action>,
    },
    Paywall {
        actions: Vec<Action>,
    },
}

impl Presentation {
    /// The view for `state`, or `None` when the user should see nothing new
    /// (cancelled or superseded runs).
    pub fn for_state(state: &WorkflowState) -> Option<Self> {
        let view = match state {
            WorkflowState::Idle => Presentation::Idle,
            WorkflowState::Submitting => Presentation::Generating { job_id: None },
            WorkflowState::Polling { job_id, .. } => Presentation::Generating {
                job_id: Some(job_id.clone()),
            },
            WorkflowState::Succeeded { job_id, result_url } => Presentation::Success {
                job_id: job_id.clone(),
                result_url: result_url.clone(),
                actions: vec![Action::Download, Action::TryAnother, Action::Continue],
            },
            WorkflowState::Failed { message, .. } => Presentation::Failure {
                message: message.clone(),
                actions: vec![Action::Back],
            },
            WorkflowState::TimedOut { .. } => Presentation::Failure {
                message: TIMED_OUT.to_string(),
                actions: vec![Action::TryAnother, Action::Back],
            },
            WorkflowState::QuotaExceeded => Presentation::Paywall {
                actions: vec![Action::Upgrade, Action::Back],
            },
            WorkflowState::Cancelled { .. } | WorkflowState::Superseded { .. } => return None,
        };
        Some(view)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Presentation::Success { .. })
    }
}

/// User-facing text for a failure.
pub fn failure_message(kind: FailureKind, backend_message: Option<&str>) -> String {
    match kind {
        FailureKind::InvalidRequest => INVALID_REQUEST.to_string(),
        FailureKind::Submission | FailureKind::Storage => SUBMISSION_FAILED.to_string(),
        FailureKind::NotFound => NOT_FOUND.to_string(),
        FailureKind::Reported => backend_message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(JOB_FAILED)
            .to_string(),
        FailureKind::Unreachable => UNREACHABLE.to_string(),
    }
}

/// Receives every view change of a workflow.
pub trait Presenter: Send + Sync {
    fn present(&self, view: &Presentation);
}

/// Publishes views on a `watch` channel for a UI loop to render.
pub struct WatchPresenter {
    tx: watch::Sender<Presentation>,
}

impl WatchPresenter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Presentation::Idle);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Presentation> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Presentation {
        self.tx.borrow().clone()
    }
}

impl Default for WatchPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Presenter for WatchPresenter {
    fn present(&self, view: &Presentation) {
        self.tx.send_replace(view.clone());
    }
}

/// Writes views to the log; used by the CLI.
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn present(&self, view: &Presentation) {
        match view {
            Presentation::Idle => {}
            Presentation::Generating { job_id: None } => tracing::info!("Submitting try-on"),
            Presentation::Generating { job_id: Some(id) } => {
                tracing::info!(job_id = %id, "Generating, this may take up to 3 minutes")
            }
            Presentation::Success { job_id, result_url, .. } => {
                tracing::info!(job_id = %job_id, result_url = %result_url, "Try-on ready")
            }
            Presentation::Failure { message, .. } => tracing::warn!(message = %message, "Try-on failed"),
            Presentation::Paywall { .. } => {
                tracing::info!("Try-on limit reached, upgrade to continue")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_view() {
        let view = Presentation::for_state(&WorkflowState::Succeeded {
            job_id: JobId::new("abc123"),
            result_url: "https://x/result.jpg".to_string(),
        })
        .unwrap();
        assert!(view.is_success());
        let Presentation::Success { actions, .. } = view else {
            panic!("expected success view");
        };
        assert!(actions.contains(&Action::Download));
        assert!(actions.contains(&Action::TryAnother));
    }

    #[test]
    fn test_silent_states() {
        assert_eq!(Presentation::for_state(&WorkflowState::Cancelled { job_id: None }), None);
        assert_eq!(
            Presentation::for_state(&WorkflowState::Superseded { job_id: JobId::new("a") }),
            None
        );
    }

    #[test]
    fn test_timeout_message_is_distinct() {
        let view = Presentation::for_state(&WorkflowState::TimedOut {
            job_id: JobId::new("a"),
            attempts: 20,
        });
        assert_eq!(
            view,
            Some(Presentation::Failure {
                message: TIMED_OUT.to_string(),
                actions: vec![Action::TryAnother, Action::Back],
            })
        );
        assert_ne!(TIMED_OUT, JOB_FAILED);
        assert_ne!(SUBMISSION_FAILED, JOB_FAILED);
    }

    #[test]
    fn test_reported_failure_prefers_backend_message() {
        assert_eq!(
            failure_message(FailureKind::Reported, Some("No garment detected")),
            "No garment detected"
        );
        assert_eq!(failure_message(FailureKind::Reported, Some(" ")), JOB_FAILED);
        assert_eq!(failure_message(FailureKind::Reported, None), JOB_FAILED);
        assert_eq!(failure_message(FailureKind::Unreachable, Some("ignored")), UNREACHABLE);
    }

    #[test]
    fn test_watch_presenter_keeps_latest() {
        let presenter = WatchPresenter::new();
        let rx = presenter.subscribe();
        presenter.present(&Presentation::Paywall { actions: vec![Action::Upgrade] });
        assert_eq!(*rx.borrow(), Presentation::Paywall { actions: vec![Action::Upgrade] });
        assert_eq!(presenter.current(), Presentation::Paywall { actions: vec![Action::Upgrade] });
    }
}
