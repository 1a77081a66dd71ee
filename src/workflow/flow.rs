//! Per-call-site parameters for the submit/poll workflow.
//!
//! The backend exposes several near-identical job endpoints that disagree
//! on field names (`taskId` vs `log_id`, `generatedImageUrl` vs
//! `styling_image_url`). A [`FlowConfig`] captures those differences so one
//! workflow implementation can drive all of them.

use serde::Deserialize;
use serde_json::Value;
use strum::{Display, EnumString};

use crate::models::job::{Job, JobId, JobStatus};

/// The try-on flows the product offers.
#[derive(Debug, Clone, Copy, Default, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum FlowKind {
    /// Upload two photos, try the garment on.
    #[default]
    FittingRoom,
    /// Try on a recommended product against the stored profile photo.
    DirectFitting,
    /// Styling recommendation rendered onto the user.
    StyleRecommendation,
}

#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub kind: FlowKind,
    /// Job-creation endpoint path (POST).
    pub submit_path: String,
    /// Status endpoint path (GET).
    pub status_path: String,
    /// Query parameter carrying the job id on the status endpoint.
    pub status_query_param: String,
    /// Candidate job-id fields in the submission response, in priority order.
    pub job_id_fields: Vec<String>,
    /// Candidate result-image fields in the status response.
    pub result_url_fields: Vec<String>,
    /// Key the current job id is persisted under.
    pub storage_key: String,
    /// Plan lookup endpoint used for the client-side quota check.
    pub plan_path: Option<String>,
}

impl FlowConfig {
    pub fn for_kind(kind: FlowKind) -> Self {
        match kind {
            FlowKind::FittingRoom => Self::fitting_room(),
            FlowKind::DirectFitting => Self::direct_fitting(),
            FlowKind::StyleRecommendation => Self::style_recommendation(),
        }
    }

    pub fn fitting_room() -> Self {
        Self {
            kind: FlowKind::FittingRoom,
            submit_path: "/tryon-image".to_string(),
            status_path: "/process-tryon-result".to_string(),
            status_query_param: "taskId".to_string(),
            job_id_fields: strings(&["taskId", "task_id", "jobId"]),
            result_url_fields: strings(&["generatedImageUrl"]),
            storage_key: "taskId".to_string(),
            plan_path: None,
        }
    }

    pub fn direct_fitting() -> Self {
        Self {
            kind: FlowKind::DirectFitting,
            storage_key: "currentTaskId".to_string(),
            plan_path: Some("/userPlan".to_string()),
            ..Self::fitting_room()
        }
    }

    pub fn style_recommendation() -> Self {
        Self {
            kind: FlowKind::StyleRecommendation,
            submit_path: "/api/tryon".to_string(),
            status_path: "/api/tryon/status".to_string(),
            status_query_param: "log_id".to_string(),
            job_id_fields: strings(&["log_id", "task_id", "taskId"]),
            result_url_fields: strings(&["styling_image_url", "generatedImageUrl"]),
            storage_key: "currentLogId".to_string(),
            plan_path: None,
        }
    }

    pub fn name(&self) -> String {
        self.kind.to_string()
    }

    /// Pull the job id out of a submission response.
    pub fn extract_job_id(&self, body: &Value) -> Option<JobId> {
        first_string(body, &self.job_id_fields).map(JobId::new)
    }

    /// Map a status response onto a [`Job`] snapshot.
    ///
    /// A success without a result image is not terminal yet; the backend
    /// flips the status before the image has been copied to storage.
    pub fn parse_status(&self, job_id: &JobId, body: &Value) -> Job {
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .map(JobStatus::from_wire)
            .unwrap_or(JobStatus::Pending);

        match status {
            JobStatus::Succeeded => match first_string(body, &self.result_url_fields) {
                Some(url) => Job::succeeded(job_id.clone(), url),
                None => {
                    tracing::debug!(job_id = %job_id, "Job succeeded without result image yet");
                    Job::pending(job_id.clone())
                }
            },
            JobStatus::Failed => {
                let message = first_string(body, &strings(&["errorMessage", "error"]));
                Job::failed(job_id.clone(), message)
            }
            JobStatus::Pending => Job::pending(job_id.clone()),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// First non-empty string (or number, for numeric ids) among `fields`.
fn first_string(body: &Value, fields: &[String]) -> Option<String> {
    fields.iter().find_map(|field| match body.get(field.as_str())? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_task_id() {
        let flow = FlowConfig::fitting_room();
        let id = flow.extract_job_id(&json!({ "taskId": "abc123" }));
        assert_eq!(id, Some(JobId::new("abc123")));
    }

    #[test]
    fn test_extract_log_id() {
        let flow = FlowConfig::style_recommendation();
        let id = flow.extract_job_id(&json!({ "log_id": 42, "message": "ok" }));
        assert_eq!(id, Some(JobId::new("42")));
    }

    #[test]
    fn test_missing_job_id() {
        let flow = FlowConfig::fitting_room();
        assert_eq!(flow.extract_job_id(&json!({ "taskId": "" })), None);
        assert_eq!(flow.extract_job_id(&json!({ "message": "queued" })), None);
    }

    #[test]
    fn test_parse_success() {
        let flow = FlowConfig::fitting_room();
        let id = JobId::new("abc123");
        let job = flow.parse_status(
            &id,
            &json!({ "status": "succeed", "generatedImageUrl": "https://x/result.jpg" }),
        );
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.result_url.as_deref(), Some("https://x/result.jpg"));
    }

    #[test]
    fn test_parse_success_uses_flow_field() {
        let flow = FlowConfig::style_recommendation();
        let id = JobId::new("7");
        let job = flow.parse_status(
            &id,
            &json!({ "status": "succeed", "styling_image_url": "https://x/s.jpg" }),
        );
        assert_eq!(job.result_url.as_deref(), Some("https://x/s.jpg"));
    }

    #[test]
    fn test_success_without_image_is_pending() {
        let flow = FlowConfig::fitting_room();
        let job = flow.parse_status(&JobId::new("a"), &json!({ "status": "succeed" }));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result_url.is_none());
    }

    #[test]
    fn test_parse_failure_message() {
        let flow = FlowConfig::fitting_room();
        let job = flow.parse_status(
            &JobId::new("a"),
            &json!({ "status": "failed", "errorMessage": "garment not detected" }),
        );
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("garment not detected"));
    }

    #[test]
    fn test_flow_kind_from_str() {
        use std::str::FromStr;
        assert_eq!(FlowKind::from_str("direct-fitting").unwrap(), FlowKind::DirectFitting);
        assert_eq!(FlowKind::StyleRecommendation.to_string(), "style-recommendation");
        assert_eq!(FlowConfig::direct_fitting().status_path, "/process-tryon-result");
    }
}
