use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use crate::services::auth::TokenProvider;

/// One user activity event, as the activity log endpoint expects it.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<serde_json::Value>,
    pub page: String,
}

impl ActivityEvent {
    pub fn new(action: impl Into<String>, page: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            timestamp: Utc::now(),
            selection: None,
            page: page.into(),
        }
    }

    pub fn with_selection(mut self, selection: serde_json::Value) -> Self {
        self.selection = Some(selection);
        self
    }
}

/// Fire-and-forget activity tracking. Delivery failures never reach the
/// caller; they are only logged.
#[derive(Clone)]
pub struct AnalyticsClient {
    http: Client,
    endpoint: Option<String>,
    auth: Arc<dyn TokenProvider>,
    session_id: Uuid,
}

impl AnalyticsClient {
    pub fn new(endpoint: Option<String>, auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            auth,
            session_id: Uuid::new_v4(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Send `event` in the background. Must be called inside a Tokio runtime.
    pub fn track(&self, event: ActivityEvent) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        let client = self.clone();

        tokio::spawn(async move {
            if let Err(e) = client.send(&endpoint, &event).await {
                tracing::warn!(action = %event.action, error = %e, "Failed to record activity event");
            }
        });
    }

    async fn send(&self, endpoint: &str, event: &ActivityEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut builder = self
            .http
            .post(endpoint)
            .header("x-session-id", self.session_id.to_string())
            .json(event);
        if let Some(token) = self.auth.bearer_token().await? {
            builder = builder.bearer_auth(token);
        }

        builder.send().await?.error_for_status()?;
        Ok(())
    }
}
