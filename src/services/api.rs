use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::models::job::{Job, JobId};
use crate::models::plan::UserPlan;
use crate::models::request::TryOnRequest;
use crate::services::auth::{AuthError, TokenProvider};
use crate::workflow::flow::FlowConfig;

/// Backend job endpoints: creation, status and the plan lookup.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Create a job and return the backend-assigned id.
    async fn submit(&self, request: &TryOnRequest) -> Result<JobId, ApiError>;

    /// Fetch the current status of a job.
    async fn status(&self, job_id: &JobId) -> Result<Job, ApiError>;

    /// Subscription details for the client-side quota check, if this
    /// endpoint family exposes them.
    async fn user_plan(&self, _user_email: &str) -> Result<Option<UserPlan>, ApiError> {
        Ok(None)
    }
}

/// `reqwest` implementation of [`JobApi`] for one flow.
pub struct HttpJobApi {
    http: Client,
    base_url: String,
    flow: FlowConfig,
    auth: Arc<dyn TokenProvider>,
}

impl HttpJobApi {
    pub fn new(base_url: &str, flow: FlowConfig, auth: Arc<dyn TokenProvider>) -> Self {
        Self::with_client(Client::new(), base_url, flow, auth)
    }

    pub fn with_client(
        http: Client,
        base_url: &str,
        flow: FlowConfig,
        auth: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            flow,
            auth,
        }
    }

    pub fn flow(&self) -> &FlowConfig {
        &self.flow
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        Ok(match self.auth.bearer_token().await? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn submit(&self, request: &TryOnRequest) -> Result<JobId, ApiError> {
        let builder = self.http.post(self.url(&self.flow.submit_path)).json(request);
        let response = self.authorized(builder).await?.send().await?;

        if response.status() == StatusCode::FORBIDDEN {
            tracing::info!(flow = %self.flow.kind, "Job submission refused: quota exceeded");
            return Err(ApiError::QuotaExceeded);
        }
        let response = ensure_success(response).await?;

        let body: Value = response.json().await?;
        self.flow.extract_job_id(&body).ok_or(ApiError::MissingJobId)
    }

    async fn status(&self, job_id: &JobId) -> Result<Job, ApiError> {
        let builder = self
            .http
            .get(self.url(&self.flow.status_path))
            .query(&[(self.flow.status_query_param.as_str(), job_id.as_str())]);
        let response = self.authorized(builder).await?.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        let response = ensure_success(response).await?;

        let body: Value = response.json().await?;
        Ok(self.flow.parse_status(job_id, &body))
    }

    async fn user_plan(&self, user_email: &str) -> Result<Option<UserPlan>, ApiError> {
        let Some(path) = &self.flow.plan_path else {
            return Ok(None);
        };

        let builder = self
            .http
            .get(self.url(path))
            .query(&[("userEmail", user_email)]);
        let response = self.authorized(builder).await?.send().await?;
        let response = ensure_success(response).await?;

        Ok(Some(response.json().await?))
    }
}

/// Turn a non-2xx response into [`ApiError::Status`], keeping the backend's
/// `error` field when it sent one.
async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string));

    Err(ApiError::Status { status, message })
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Try-on quota exceeded")]
    QuotaExceeded,

    #[error("Job not found")]
    NotFound,

    #[error("Backend returned {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Status {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("Submission response did not contain a job id")]
    MissingJobId,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authorization failed: {0}")]
    Auth(#[from] AuthError),
}
