use std::time::Duration;

use serde::Deserialize;

use crate::workflow::flow::FlowKind;
use crate::workflow::poller::PollPolicy;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Backend API gateway base URL (e.g., "https://api.example.com/prod")
    pub api_base_url: String,

    /// Bearer token issued by the identity provider. Optional for anonymous use.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Redis connection string; when set, the current job id survives restarts.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Which try-on flow to drive.
    #[serde(default)]
    pub flow: FlowKind,

    /// Delay between status requests, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Status responses allowed before reporting a timeout
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// 404 responses tolerated while the backend persists a new job
    #[serde(default = "default_max_not_found_retries")]
    pub max_not_found_retries: u32,

    /// Wait before the first status request, in milliseconds
    #[serde(default)]
    pub initial_poll_delay_ms: u64,

    /// Activity logging endpoint. Tracking is off when unset.
    #[serde(default)]
    pub analytics_url: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_max_poll_attempts() -> u32 {
    20
}

fn default_max_not_found_retries() -> u32 {
    3
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts.max(1),
            max_not_found_retries: self.max_not_found_retries,
            initial_delay: Duration::from_millis(self.initial_poll_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig =
            envy::from_iter(vars(&[("API_BASE_URL", "https://api.example.com")])).unwrap();
        assert_eq!(config.flow, FlowKind::FittingRoom);
        assert!(config.api_token.is_none());

        let policy = config.poll_policy();
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.max_not_found_retries, 3);
        assert!(policy.initial_delay.is_zero());
    }

    #[test]
    fn test_overrides() {
        let config: AppConfig = envy::from_iter(vars(&[
            ("API_BASE_URL", "https://api.example.com"),
            ("FLOW", "style-recommendation"),
            ("POLL_INTERVAL_MS", "3000"),
            ("MAX_POLL_ATTEMPTS", "0"),
            ("INITIAL_POLL_DELAY_MS", "10000"),
        ]))
        .unwrap();
        assert_eq!(config.flow, FlowKind::StyleRecommendation);

        let policy = config.poll_policy();
        assert_eq!(policy.interval, Duration::from_secs(3));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_missing_base_url() {
        let result: Result<AppConfig, _> = envy::from_iter(vars(&[("FLOW", "fitting-room")]));
        assert!(result.is_err());
    }
}
