//! In-memory TTL map backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::ProgressSnapshot;

struct Entry {
    snapshot: ProgressSnapshot,
    expires_at: Instant,
}

/// Default process-local backend.
///
/// Thread-safe via interior `RwLock`; cheap to clone, all clones share the
/// same map. Expired entries are skipped on read and dropped for real by
/// [`purge_expired`](MemoryProgressStore::purge_expired), which the service
/// binary runs on a background sweep.
#[derive(Clone)]
pub struct MemoryProgressStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    ttl: Duration,
}

impl MemoryProgressStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn put(&self, job_id: &str, snapshot: ProgressSnapshot) {
        let entry = Entry {
            snapshot,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(job_id.to_string(), entry);
    }

    pub async fn get(&self, job_id: &str) -> Option<ProgressSnapshot> {
        let entries = self.entries.read().await;
        let entry = entries.get(job_id)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.snapshot.clone())
    }

    pub async fn remove(&self, job_id: &str) {
        self.entries.write().await.remove(job_id);
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}
