//! Submit → poll → present orchestration for try-on and styling jobs.

pub mod flow;
pub mod poller;
pub mod presenter;
pub mod state;
pub mod submitter;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::models::job::JobId;
use crate::models::request::TryOnRequest;
use crate::services::analytics::{ActivityEvent, AnalyticsClient};
use crate::services::api::JobApi;
use crate::services::store::JobStore;

use flow::FlowConfig;
use poller::{PollOutcome, PollPolicy, Poller};
use presenter::{failure_message, Presentation, Presenter};
use state::{FailureKind, WorkflowState};
use submitter::{SubmitError, SubmitOutcome, Submitter};

/// The run currently allowed to drive the shared state.
struct ActiveRun {
    generation: u64,
    cancel: CancellationToken,
}

/// Identity of one `run`/`resume` call.
struct RunToken {
    generation: u64,
    cancel: CancellationToken,
}

/// One page's job workflow: a single active job at a time, shared state
/// observable through [`JobWorkflow::subscribe`].
///
/// Starting a run cancels the previous one: its pending timer and its
/// in-flight request are dropped, and it can no longer present anything.
pub struct JobWorkflow {
    flow: FlowConfig,
    submitter: Submitter,
    poller: Poller,
    store: Arc<dyn JobStore>,
    presenter: Arc<dyn Presenter>,
    analytics: Option<AnalyticsClient>,
    state: watch::Sender<WorkflowState>,
    active: Mutex<ActiveRun>,
}

impl JobWorkflow {
    pub fn new(
        flow: FlowConfig,
        api: Arc<dyn JobApi>,
        store: Arc<dyn JobStore>,
        policy: PollPolicy,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let (state, _rx) = watch::channel(WorkflowState::Idle);
        Self {
            flow,
            submitter: Submitter::new(api.clone(), store.clone()),
            poller: Poller::new(api, store.clone(), policy),
            store,
            presenter,
            analytics: None,
            state,
            active: Mutex::new(ActiveRun {
                generation: 0,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn with_analytics(mut self, analytics: AnalyticsClient) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn flow(&self) -> &FlowConfig {
        &self.flow
    }

    pub fn state(&self) -> WorkflowState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }

    /// Submit `request` and poll it to completion.
    ///
    /// Always returns the final state; failures are already translated for
    /// the presenter. Cancelled runs present nothing. A run replaced by a
    /// newer one ends as `Superseded` (or `Cancelled` with no job id when it
    /// had not been submitted yet) and leaves the shared state alone.
    pub async fn run(&self, request: TryOnRequest, cancel: &CancellationToken) -> WorkflowState {
        let started = Instant::now();
        let run = self.begin_run(cancel);
        self.transition(&run, WorkflowState::Submitting);

        let submitted = tokio::select! {
            biased;
            _ = run.cancel.cancelled() => None,
            result = self.submitter.submit(&request) => Some(result),
        };

        let job_id = match submitted {
            None if !cancel.is_cancelled() => {
                tracing::debug!(flow = %self.flow.kind, "Submission replaced by a newer run");
                return WorkflowState::Cancelled { job_id: None };
            }
            None => return self.finish(&run, WorkflowState::Cancelled { job_id: None }, started),
            Some(Ok(SubmitOutcome::Submitted(job_id))) => job_id,
            Some(Ok(SubmitOutcome::QuotaExceeded)) => {
                return self.finish(&run, WorkflowState::QuotaExceeded, started)
            }
            Some(Err(e)) => {
                tracing::error!(flow = %self.flow.kind, error = %e, "Try-on submission failed");
                let kind = match e {
                    SubmitError::Invalid(_) => FailureKind::InvalidRequest,
                    SubmitError::Api(_) => FailureKind::Submission,
                    SubmitError::Store(_) => FailureKind::Storage,
                };
                let failed = WorkflowState::Failed {
                    job_id: None,
                    kind,
                    message: failure_message(kind, None),
                };
                return self.finish(&run, failed, started);
            }
        };

        metrics::counter!("tryon_jobs_submitted_total", "flow" => self.flow.name()).increment(1);
        self.track("tryon_submitted", Some(&job_id));

        self.poll_job(&run, job_id, cancel, started).await
    }

    /// Pick up polling for the job persisted by an earlier, interrupted run.
    /// Returns `None` when there is nothing to resume.
    pub async fn resume(&self, cancel: &CancellationToken) -> Option<WorkflowState> {
        let job_id = match self.store.current_job_id().await {
            Ok(Some(id)) => id,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read persisted job id, nothing to resume");
                return None;
            }
        };

        tracing::info!(job_id = %job_id, flow = %self.flow.kind, "Resuming job");
        let run = self.begin_run(cancel);
        Some(self.poll_job(&run, job_id, cancel, Instant::now()).await)
    }

    /// Run in the background. Dropping or cancelling the handle stops the
    /// run the way leaving the page does.
    pub fn spawn(self: &Arc<Self>, request: TryOnRequest) -> WorkflowHandle {
        let cancel = CancellationToken::new();
        let workflow = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move { workflow.run(request, &token).await });

        WorkflowHandle {
            cancel,
            task: Some(task),
        }
    }

    /// Cancel whatever run is active and make this one current. The run's
    /// token is a child of `cancel`, so the caller can still stop it.
    fn begin_run(&self, cancel: &CancellationToken) -> RunToken {
        let mut active = self.lock_active();
        active.cancel.cancel();
        active.generation += 1;
        active.cancel = cancel.child_token();

        RunToken {
            generation: active.generation,
            cancel: active.cancel.clone(),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveRun> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll_job(
        &self,
        run: &RunToken,
        job_id: JobId,
        cancel: &CancellationToken,
        started: Instant,
    ) -> WorkflowState {
        self.transition(run, WorkflowState::Polling {
            job_id: job_id.clone(),
            attempt: 0,
        });

        let outcome = self
            .poller
            .poll(&job_id, &run.cancel, |attempt| {
                // Only this run's own polling state is updated; a newer run
                // may already own the state.
                let active = self.lock_active();
                if active.generation != run.generation {
                    return;
                }
                self.state.send_if_modified(|state| match state {
                    WorkflowState::Polling { job_id: current, attempt: n } if *current == job_id => {
                        *n = attempt;
                        true
                    }
                    _ => false,
                });
            })
            .await;

        let next = match outcome {
            PollOutcome::Succeeded { result_url } => WorkflowState::Succeeded {
                job_id: job_id.clone(),
                result_url,
            },
            PollOutcome::Failed { message } => WorkflowState::Failed {
                job_id: Some(job_id.clone()),
                kind: FailureKind::Reported,
                message: failure_message(FailureKind::Reported, message.as_deref()),
            },
            PollOutcome::NotFound => WorkflowState::Failed {
                job_id: Some(job_id.clone()),
                kind: FailureKind::NotFound,
                message: failure_message(FailureKind::NotFound, None),
            },
            PollOutcome::Unreachable { .. } => WorkflowState::Failed {
                job_id: Some(job_id.clone()),
                kind: FailureKind::Unreachable,
                message: failure_message(FailureKind::Unreachable, None),
            },
            PollOutcome::TimedOut { attempts } => WorkflowState::TimedOut {
                job_id: job_id.clone(),
                attempts,
            },
            PollOutcome::Superseded => {
                return WorkflowState::Superseded { job_id };
            }
            PollOutcome::Cancelled if !cancel.is_cancelled() => {
                tracing::debug!(job_id = %job_id, "Polling replaced by a newer run");
                return WorkflowState::Superseded { job_id };
            }
            PollOutcome::Cancelled => {
                // Keep the persisted id so the job can be resumed.
                tracing::info!(job_id = %job_id, "Polling cancelled");
                return self.finish(run, WorkflowState::Cancelled { job_id: Some(job_id) }, started);
            }
        };

        // The job is settled; nothing left to resume after a reload. A newer
        // job's id is left alone.
        if let Err(e) = self.store.clear_current_job_id_if(&job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to clear persisted job id");
        }

        self.finish(run, next, started)
    }

    /// Record a terminal state, present it and emit metrics.
    fn finish(&self, run: &RunToken, state: WorkflowState, started: Instant) -> WorkflowState {
        let flow = self.flow.name();
        let outcome = state.label();

        match &state {
            WorkflowState::Cancelled { .. } => {}
            _ => {
                metrics::counter!("tryon_jobs_finished_total", "flow" => flow.clone(), "outcome" => outcome)
                    .increment(1);
                metrics::histogram!("tryon_job_duration_seconds", "flow" => flow)
                    .record(started.elapsed().as_secs_f64());
                self.track(&format!("tryon_{outcome}"), state.job_id());
            }
        }

        self.transition(run, state.clone());
        state
    }

    /// Publish `next` for `run`. A run that has been replaced changes
    /// nothing; the check and the update happen under the same lock.
    fn transition(&self, run: &RunToken, next: WorkflowState) {
        let active = self.lock_active();
        if active.generation != run.generation {
            tracing::debug!(to = next.label(), "Ignoring transition from a replaced run");
            return;
        }

        let current = self.state.borrow().clone();
        if !current.can_transition_to(&next) {
            tracing::debug!(from = current.label(), to = next.label(), "Unexpected workflow transition");
        }

        if let Some(view) = Presentation::for_state(&next) {
            self.presenter.present(&view);
        }
        self.state.send_replace(next);
    }

    fn track(&self, action: &str, job_id: Option<&JobId>) {
        if let Some(analytics) = &self.analytics {
            let mut event = ActivityEvent::new(action, self.flow.name());
            if let Some(id) = job_id {
                event = event.with_selection(serde_json::json!({ "job_id": id }));
            }
            analytics.track(event);
        }
    }
}

/// Handle to a spawned run.
pub struct WorkflowHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<WorkflowState>>,
}

impl WorkflowHandle {
    /// Abort the in-flight request and stop scheduling polls.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the run to end and return its final state.
    pub async fn join(mut self) -> Result<WorkflowState, JoinError> {
        match self.task.take() {
            Some(task) => task.await,
            None => Ok(WorkflowState::Cancelled { job_id: None }),
        }
    }
}

impl Drop for WorkflowHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
