//! Ephemeral progress store.
//!
//! Holds the most recent progress snapshot per job under a fixed TTL that
//! is independent of the job record's lifetime. A snapshot may legitimately
//! be absent for an active job (expired, or never reported); readers treat
//! absence as "no progress information", never as an error.
//!
//! The in-memory backend is the default. The Redis backend is compiled in
//! behind the `redis` cargo feature for deployments where the dispatcher
//! and the streaming gateway run in separate processes.

use std::time::Duration;

use chrono::Utc;
use quarry_core::error::CoreError;
use quarry_core::progress::{
    clamp_increment, validate_percent, COMPLETE_MESSAGE, FAILED_MESSAGE_PREFIX,
    FAILED_METADATA_KEY,
};
use quarry_core::types::Timestamp;
use serde::{Deserialize, Serialize};

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

/// The most recent progress report for a job.
///
/// Overwritten whole on every update; last writer wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub percent: u8,
    pub message: String,
    pub timestamp: Timestamp,
    pub metadata: Option<serde_json::Value>,
}

/// Progress store with pluggable backends.
///
/// Cheap to clone; all clones share the same backing data.
#[derive(Clone)]
pub enum ProgressStore {
    Memory(memory::MemoryProgressStore),
    #[cfg(feature = "redis")]
    Redis(redis_store::RedisProgressStore),
}

impl ProgressStore {
    /// Create an in-memory store whose snapshots expire after `ttl`.
    pub fn in_memory(ttl: Duration) -> Self {
        ProgressStore::Memory(memory::MemoryProgressStore::new(ttl))
    }

    /// Create a Redis-backed store (`quarry:progress:<job_id>` keys).
    #[cfg(feature = "redis")]
    pub fn redis(url: &str, ttl: Duration) -> Result<Self, CoreError> {
        Ok(ProgressStore::Redis(redis_store::RedisProgressStore::new(
            url, ttl,
        )?))
    }

    /// Write a full snapshot for `job_id`.
    ///
    /// Rejects `percent` outside `0..=100` with a validation error; the
    /// value inside the range is stored verbatim.
    pub async fn update(
        &self,
        job_id: &str,
        percent: i32,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), CoreError> {
        let percent = validate_percent(percent)?;
        let snapshot = ProgressSnapshot {
            percent,
            message: message.to_string(),
            timestamp: Utc::now(),
            metadata,
        };
        match self {
            ProgressStore::Memory(store) => {
                store.put(job_id, snapshot).await;
                Ok(())
            }
            #[cfg(feature = "redis")]
            ProgressStore::Redis(store) => store.put(job_id, &snapshot).await,
        }
    }

    /// Read the current snapshot, treating expired entries as absent.
    pub async fn get(&self, job_id: &str) -> Result<Option<ProgressSnapshot>, CoreError> {
        match self {
            ProgressStore::Memory(store) => Ok(store.get(job_id).await),
            #[cfg(feature = "redis")]
            ProgressStore::Redis(store) => store.get(job_id).await,
        }
    }

    /// Add `amount` to the current percent (0 if absent), clamped at 100.
    pub async fn increment(
        &self,
        job_id: &str,
        amount: u8,
        message: &str,
    ) -> Result<(), CoreError> {
        let current = self.get(job_id).await?.map(|s| s.percent).unwrap_or(0);
        let percent = clamp_increment(current, amount);
        self.update(job_id, percent as i32, message, None).await
    }

    /// Mark progress complete: percent 100 with the standard message.
    pub async fn complete(&self, job_id: &str) -> Result<(), CoreError> {
        self.update(job_id, 100, COMPLETE_MESSAGE, None).await
    }

    /// Mark progress failed: percent reset to 0 with the failure flag set
    /// in metadata, which keeps a failed job distinct from one that never
    /// started.
    pub async fn fail(&self, job_id: &str, error_message: &str) -> Result<(), CoreError> {
        let message = format!("{FAILED_MESSAGE_PREFIX}{error_message}");
        let metadata = serde_json::json!({ FAILED_METADATA_KEY: true });
        self.update(job_id, 0, &message, Some(metadata)).await
    }

    /// Remove the snapshot for `job_id`, if any.
    pub async fn clear(&self, job_id: &str) -> Result<(), CoreError> {
        match self {
            ProgressStore::Memory(store) => {
                store.remove(job_id).await;
                Ok(())
            }
            #[cfg(feature = "redis")]
            ProgressStore::Redis(store) => store.remove(job_id).await,
        }
    }

    /// Drop expired entries and return how many were removed.
    ///
    /// Redis evicts by TTL natively, so its backend always returns 0.
    pub async fn purge_expired(&self) -> Result<usize, CoreError> {
        match self {
            ProgressStore::Memory(store) => Ok(store.purge_expired().await),
            #[cfg(feature = "redis")]
            ProgressStore::Redis(_) => Ok(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
