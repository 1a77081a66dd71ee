use std::sync::Arc;

use chrono::Utc;
use garde::Validate;

use crate::models::job::JobId;
use crate::models::request::TryOnRequest;
use crate::services::api::{ApiError, JobApi};
use crate::services::store::{JobStore, StoreError};

/// Result of a submission that did not error.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted(JobId),
    /// The user is out of try-ons; show the paywall instead of an error.
    QuotaExceeded,
}

/// Turns a try-on request into a backend job and records it as the
/// session's current job.
pub struct Submitter {
    api: Arc<dyn JobApi>,
    store: Arc<dyn JobStore>,
}

impl Submitter {
    pub fn new(api: Arc<dyn JobApi>, store: Arc<dyn JobStore>) -> Self {
        Self { api, store }
    }

    pub async fn submit(&self, request: &TryOnRequest) -> Result<SubmitOutcome, SubmitError> {
        request.validate().map_err(SubmitError::Invalid)?;

        if self.plan_exhausted(&request.user_email).await {
            return Ok(SubmitOutcome::QuotaExceeded);
        }

        let job_id = match self.api.submit(request).await {
            Ok(id) => id,
            Err(ApiError::QuotaExceeded) => return Ok(SubmitOutcome::QuotaExceeded),
            Err(e) => return Err(SubmitError::Api(e)),
        };

        self.store
            .set_current_job_id(&job_id)
            .await
            .map_err(SubmitError::Store)?;

        tracing::info!(job_id = %job_id, "Try-on job submitted");
        Ok(SubmitOutcome::Submitted(job_id))
    }

    /// Client-side quota check. A failed plan lookup is not fatal; the
    /// backend still refuses over-quota submissions with a 403.
    async fn plan_exhausted(&self, user_email: &str) -> bool {
        match self.api.user_plan(user_email).await {
            Ok(Some(plan)) => {
                let now = Utc::now();
                let exhausted = plan.quota_exceeded(now);
                if exhausted {
                    tracing::info!(
                        plan = %plan.active_plan(now),
                        used = plan.try_on_count,
                        "Try-on limit reached for current plan"
                    );
                }
                exhausted
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Plan lookup failed, deferring quota check to backend");
                false
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Invalid try-on request: {0}")]
    Invalid(garde::Report),

    #[error(transparent)]
    Api(ApiError),

    #[error("Failed to persist job id: {0}")]
    Store(StoreError),
}
