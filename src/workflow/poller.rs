//! Fixed-interval status polling for a submitted job.
//!
//! Requests for one job are strictly sequential: the next request is only
//! scheduled after the previous response arrived and the interval elapsed.
//! Every request and every wait races the run's [`CancellationToken`], so a
//! cancelled poller drops its in-flight request and schedules nothing more.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::models::job::{JobId, JobStatus};
use crate::services::api::{ApiError, JobApi};
use crate::services::store::JobStore;

/// Tunable limits for [`Poller::poll`].
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Delay between consecutive status requests.
    pub interval: Duration,
    /// Non-404 responses allowed before giving up with a timeout.
    pub max_attempts: u32,
    /// 404 responses tolerated before the job is considered missing.
    pub max_not_found_retries: u32,
    /// Wait before the first request, giving the backend time to persist
    /// the job record.
    pub initial_delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 20,
            max_not_found_retries: 3,
            initial_delay: Duration::ZERO,
        }
    }
}

/// How a poll run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Succeeded { result_url: String },
    Failed { message: Option<String> },
    /// More 404s than the retry budget allows.
    NotFound,
    /// A status request failed for another reason.
    Unreachable { error: String },
    TimedOut { attempts: u32 },
    /// The session moved on to another job.
    Superseded,
    Cancelled,
}

pub struct Poller {
    api: Arc<dyn JobApi>,
    store: Arc<dyn JobStore>,
    policy: PollPolicy,
}

impl Poller {
    pub fn new(api: Arc<dyn JobApi>, store: Arc<dyn JobStore>, policy: PollPolicy) -> Self {
        Self { api, store, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll `job_id` until it is terminal, the budget is spent, the session
    /// moves on, or `cancel` fires. `on_attempt` is told about every counted
    /// attempt.
    pub async fn poll<F>(&self, job_id: &JobId, cancel: &CancellationToken, mut on_attempt: F) -> PollOutcome
    where
        F: FnMut(u32) + Send,
    {
        let mut attempts = 0u32;
        let mut not_found = 0u32;

        if !self.policy.initial_delay.is_zero() && !wait(self.policy.initial_delay, cancel).await {
            return PollOutcome::Cancelled;
        }

        loop {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled;
            }
            if self.is_stale(job_id).await {
                tracing::debug!(job_id = %job_id, "Stale poller, stopping");
                return PollOutcome::Superseded;
            }

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                response = self.api.status(job_id) => response,
            };
            metrics::counter!("tryon_poll_requests_total").increment(1);

            let terminal = match response {
                Err(ApiError::NotFound) => {
                    not_found += 1;
                    if not_found > self.policy.max_not_found_retries {
                        tracing::warn!(job_id = %job_id, not_found, "Job still not found, giving up");
                        Some(PollOutcome::NotFound)
                    } else {
                        tracing::debug!(job_id = %job_id, not_found, "Job not available yet, retrying");
                        None
                    }
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Status request failed");
                    Some(PollOutcome::Unreachable { error: e.to_string() })
                }
                Ok(job) => {
                    attempts += 1;
                    on_attempt(attempts);
                    tracing::debug!(job_id = %job_id, attempt = attempts, status = %job.status, "Polled job status");

                    match (job.status, job.result_url) {
                        (JobStatus::Succeeded, Some(result_url)) => {
                            Some(PollOutcome::Succeeded { result_url })
                        }
                        (JobStatus::Failed, _) => Some(PollOutcome::Failed {
                            message: job.error_message,
                        }),
                        _ if attempts >= self.policy.max_attempts => {
                            tracing::warn!(job_id = %job_id, attempts, "Polling budget exhausted");
                            Some(PollOutcome::TimedOut { attempts })
                        }
                        _ => None,
                    }
                }
            };

            if let Some(outcome) = terminal {
                // A newer job may have started while this request was in flight.
                if self.is_stale(job_id).await {
                    return PollOutcome::Superseded;
                }
                return outcome;
            }

            if !wait(self.policy.interval, cancel).await {
                return PollOutcome::Cancelled;
            }
        }
    }

    /// True when the store no longer names `job_id` as the current job.
    /// A store that cannot be read does not stop polling.
    async fn is_stale(&self, job_id: &JobId) -> bool {
        match self.store.current_job_id().await {
            Ok(Some(current)) => &current != job_id,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Could not read current job id");
                false
            }
        }
    }
}

/// Sleep for `delay`, returning `false` if cancelled first.
async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.max_not_found_retries, 3);
        assert!(policy.initial_delay.is_zero());
    }
}
