//! Redis-backed progress store (`redis` cargo feature).
//!
//! One key per job, `quarry:progress:<job_id>`, holding the JSON-encoded
//! snapshot with a fixed TTL. The redis client is synchronous; every
//! command runs on the blocking pool so the async callers never stall a
//! runtime worker.

use std::sync::Arc;
use std::time::Duration;

use quarry_core::error::CoreError;

use crate::ProgressSnapshot;

/// Key prefix for progress snapshots.
const KEY_PREFIX: &str = "quarry:progress:";

#[derive(Clone)]
pub struct RedisProgressStore {
    client: Arc<redis::Client>,
    ttl_secs: u64,
}

impl RedisProgressStore {
    pub fn new(url: &str, ttl: Duration) -> Result<Self, CoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| CoreError::Internal(format!("Redis client open failed: {e}")))?;
        Ok(Self {
            client: Arc::new(client),
            ttl_secs: ttl.as_secs().max(1),
        })
    }

    fn key(job_id: &str) -> String {
        format!("{KEY_PREFIX}{job_id}")
    }

    pub async fn put(&self, job_id: &str, snapshot: &ProgressSnapshot) -> Result<(), CoreError> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|e| CoreError::Internal(format!("Snapshot serialization failed: {e}")))?;
        let client = self.client.clone();
        let key = Self::key(job_id);
        let ttl_secs = self.ttl_secs;

        run_blocking(move || {
            let mut conn = client.get_connection()?;
            redis::cmd("SET")
                .arg(&key)
                .arg(&payload)
                .arg("EX")
                .arg(ttl_secs)
                .query::<()>(&mut conn)
        })
        .await
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<ProgressSnapshot>, CoreError> {
        let client = self.client.clone();
        let key = Self::key(job_id);

        let payload: Option<String> = run_blocking(move || {
            let mut conn = client.get_connection()?;
            redis::cmd("GET").arg(&key).query(&mut conn)
        })
        .await?;

        match payload {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| CoreError::Internal(format!("Snapshot deserialization failed: {e}"))),
            None => Ok(None),
        }
    }

    pub async fn remove(&self, job_id: &str) -> Result<(), CoreError> {
        let client = self.client.clone();
        let key = Self::key(job_id);

        run_blocking(move || {
            let mut conn = client.get_connection()?;
            redis::cmd("DEL").arg(&key).query::<()>(&mut conn)
        })
        .await
    }
}

/// Run a synchronous redis closure on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, CoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, redis::RedisError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::Internal(format!("Redis task join failed: {e}")))?
        .map_err(|e| CoreError::Internal(format!("Redis command failed: {e}")))
}
