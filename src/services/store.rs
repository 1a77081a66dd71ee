use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::models::job::JobId;

const KEY_PREFIX: &str = "fyuse:session";

/// Persisted ids only need to outlive a reload, not the session.
const JOB_ID_TTL_SECS: u64 = 60 * 60;

/// Atomic compare-and-delete on the job id key.
const CLEAR_IF_MATCHES: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Where the id of the job currently being polled is kept.
///
/// The stored value doubles as the staleness sentinel: a poller only keeps
/// going while the store still holds the id it was started with.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn current_job_id(&self) -> Result<Option<JobId>, StoreError>;
    async fn set_current_job_id(&self, job_id: &JobId) -> Result<(), StoreError>;
    async fn clear_current_job_id(&self) -> Result<(), StoreError>;

    /// Clear the slot only while it still holds `job_id`, so a settling run
    /// never removes the id of a job started after it. Returns whether the
    /// slot was cleared.
    async fn clear_current_job_id_if(&self, job_id: &JobId) -> Result<bool, StoreError>;
}

/// In-process store. Clones share the same slot.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    slot: Arc<Mutex<Option<JobId>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn current_job_id(&self) -> Result<Option<JobId>, StoreError> {
        Ok(self.slot.lock().await.clone())
    }

    async fn set_current_job_id(&self, job_id: &JobId) -> Result<(), StoreError> {
        *self.slot.lock().await = Some(job_id.clone());
        Ok(())
    }

    async fn clear_current_job_id(&self) -> Result<(), StoreError> {
        self.slot.lock().await.take();
        Ok(())
    }

    async fn clear_current_job_id_if(&self, job_id: &JobId) -> Result<bool, StoreError> {
        let mut slot = self.slot.lock().await;
        if slot.as_ref() == Some(job_id) {
            *slot = None;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Redis-backed store so a restarted client can resume polling.
pub struct RedisJobStore {
    client: redis::Client,
    key: String,
}

impl RedisJobStore {
    pub fn new(redis_url: &str, storage_key: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(StoreError::Redis)?;
        Ok(Self {
            client,
            key: format!("{KEY_PREFIX}:{storage_key}"),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Check Redis connectivity.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(StoreError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(StoreError::Redis)?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn current_job_id(&self) -> Result<Option<JobId>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(StoreError::Redis)?;
        let value: Option<String> = conn.get(&self.key).await.map_err(StoreError::Redis)?;
        Ok(value.map(JobId::new))
    }

    async fn set_current_job_id(&self, job_id: &JobId) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(StoreError::Redis)?;
        conn.set_ex::<_, _, ()>(&self.key, job_id.as_str(), JOB_ID_TTL_SECS)
            .await
            .map_err(StoreError::Redis)?;
        Ok(())
    }

    async fn clear_current_job_id(&self) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(StoreError::Redis)?;
        conn.del::<_, ()>(&self.key).await.map_err(StoreError::Redis)?;
        Ok(())
    }

    async fn clear_current_job_id_if(&self, job_id: &JobId) -> Result<bool, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(StoreError::Redis)?;
        let removed: i64 = redis::Script::new(CLEAR_IF_MATCHES)
            .key(&self.key)
            .arg(job_id.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(StoreError::Redis)?;
        Ok(removed > 0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
