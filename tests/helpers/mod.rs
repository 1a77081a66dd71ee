//! Test doubles for driving the workflow without a backend

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fyuse_tryon::{
    models::{
        job::{Job, JobId},
        plan::UserPlan,
        request::TryOnRequest,
    },
    services::{
        api::{ApiError, JobApi},
        store::{JobStore, MemoryJobStore, StoreError},
    },
    workflow::{
        flow::FlowConfig,
        poller::PollPolicy,
        presenter::{Presentation, Presenter},
        JobWorkflow,
    },
};
use reqwest::StatusCode;

/// One scripted backend answer to a status request.
#[derive(Debug, Clone)]
pub enum Reply {
    Pending,
    Succeed(&'static str),
    Failed(Option<&'static str>),
    NotFound,
    ServerError,
}

/// One scripted backend answer to a submission.
#[derive(Debug, Clone)]
pub enum SubmitReply {
    Accepted(&'static str),
    Forbidden,
    ServerError,
}

/// In-memory [`JobApi`] that replays scripted responses and counts calls.
///
/// Status requests for a job with no remaining script answer `Pending`.
#[derive(Default)]
pub struct ScriptedApi {
    submits: Mutex<VecDeque<SubmitReply>>,
    statuses: Mutex<HashMap<String, VecDeque<Reply>>>,
    plan: Mutex<Option<UserPlan>>,
    status_delay: Mutex<Option<Duration>>,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub plan_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, reply: SubmitReply) -> Self {
        self.submits.lock().unwrap().push_back(reply);
        self
    }

    pub fn on_status(self, job_id: &str, replies: Vec<Reply>) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .extend(replies);
        self
    }

    pub fn with_plan(self, plan: UserPlan) -> Self {
        *self.plan.lock().unwrap() = Some(plan);
        self
    }

    /// Make every status request take `delay` before answering.
    pub fn with_status_delay(self, delay: Duration) -> Self {
        *self.status_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Total network calls made against the job endpoints.
    pub fn network_calls(&self) -> usize {
        self.submits() + self.polls()
    }
}

#[async_trait]
impl JobApi for ScriptedApi {
    async fn submit(&self, _request: &TryOnRequest) -> Result<JobId, ApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.submits.lock().unwrap().pop_front();
        match reply {
            Some(SubmitReply::Accepted(id)) => Ok(JobId::new(id)),
            Some(SubmitReply::Forbidden) => Err(ApiError::QuotaExceeded),
            Some(SubmitReply::ServerError) | None => Err(ApiError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: Some("Internal server error".to_string()),
            }),
        }
    }

    async fn status(&self, job_id: &JobId) -> Result<Job, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(job_id.as_str())
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply::Pending);

        match reply {
            Reply::Pending => Ok(Job::pending(job_id.clone())),
            Reply::Succeed(url) => Ok(Job::succeeded(job_id.clone(), url)),
            Reply::Failed(message) => Ok(Job::failed(job_id.clone(), message.map(str::to_string))),
            Reply::NotFound => Err(ApiError::NotFound),
            Reply::ServerError => Err(ApiError::Status {
                status: StatusCode::BAD_GATEWAY,
                message: None,
            }),
        }
    }

    async fn user_plan(&self, _user_email: &str) -> Result<Option<UserPlan>, ApiError> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.plan.lock().unwrap().clone())
    }
}

/// Presenter that remembers every view it was shown.
#[derive(Default)]
pub struct RecordingPresenter {
    views: Mutex<Vec<Presentation>>,
}

impl RecordingPresenter {
    pub fn views(&self) -> Vec<Presentation> {
        self.views.lock().unwrap().clone()
    }

    pub fn success_count(&self) -> usize {
        self.views().iter().filter(|v| v.is_success()).count()
    }

    pub fn last(&self) -> Option<Presentation> {
        self.views().last().cloned()
    }
}

impl Presenter for RecordingPresenter {
    fn present(&self, view: &Presentation) {
        self.views.lock().unwrap().push(view.clone());
    }
}

/// [`MemoryJobStore`] that waits `latency` before every operation, to
/// widen the gaps between a run's store reads and writes.
#[derive(Clone)]
pub struct SlowStore {
    inner: MemoryJobStore,
    latency: Duration,
}

impl SlowStore {
    pub fn new(latency: Duration) -> Self {
        Self {
            inner: MemoryJobStore::new(),
            latency,
        }
    }
}

#[async_trait]
impl JobStore for SlowStore {
    async fn current_job_id(&self) -> Result<Option<JobId>, StoreError> {
        tokio::time::sleep(self.latency).await;
        self.inner.current_job_id().await
    }

    async fn set_current_job_id(&self, job_id: &JobId) -> Result<(), StoreError> {
        tokio::time::sleep(self.latency).await;
        self.inner.set_current_job_id(job_id).await
    }

    async fn clear_current_job_id(&self) -> Result<(), StoreError> {
        tokio::time::sleep(self.latency).await;
        self.inner.clear_current_job_id().await
    }

    async fn clear_current_job_id_if(&self, job_id: &JobId) -> Result<bool, StoreError> {
        tokio::time::sleep(self.latency).await;
        self.inner.clear_current_job_id_if(job_id).await
    }
}

pub struct Harness {
    pub api: Arc<ScriptedApi>,
    pub store: MemoryJobStore,
    pub presenter: Arc<RecordingPresenter>,
    pub workflow: Arc<JobWorkflow>,
}

pub fn harness(api: ScriptedApi, policy: PollPolicy) -> Harness {
    let api = Arc::new(api);
    let store = MemoryJobStore::new();
    let presenter = Arc::new(RecordingPresenter::default());
    let workflow = Arc::new(JobWorkflow::new(
        FlowConfig::fitting_room(),
        api.clone(),
        Arc::new(store.clone()),
        policy,
        presenter.clone(),
    ));

    Harness {
        api,
        store,
        presenter,
        workflow,
    }
}

/// A second page over an existing backend and store.
pub fn workflow_over(
    api: Arc<ScriptedApi>,
    store: Arc<dyn JobStore>,
    presenter: Arc<RecordingPresenter>,
) -> Arc<JobWorkflow> {
    Arc::new(JobWorkflow::new(FlowConfig::fitting_room(), api, store, policy(), presenter))
}

pub fn policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_secs(5),
        max_attempts: 20,
        max_not_found_retries: 3,
        initial_delay: Duration::ZERO,
    }
}

pub fn request() -> TryOnRequest {
    TryOnRequest::new("https://x/a.jpg", "https://x/b.jpg", "jane@example.com")
}
