//! Per-principal concurrent stream accounting.
//!
//! Each admitted stream records its admission timestamp in the principal's
//! window. Entries leave the window in one of two ways: the stream's
//! [`ConnectionGuard`] drops (normal end, error, or client disconnect), or
//! the entry exceeds `max_age` and is purged lazily on the next `admit` for
//! that principal. The age backstop keeps a leaked entry from pinning a slot
//! forever.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;

use quarry_core::types::Timestamp;

type Windows = Arc<Mutex<HashMap<String, Vec<Timestamp>>>>;

/// Bounds concurrent SSE streams per principal.
#[derive(Clone)]
pub struct StreamLimiter {
    max_concurrent: usize,
    max_age: chrono::Duration,
    windows: Windows,
}

impl StreamLimiter {
    pub fn new(max_concurrent: usize, max_age: chrono::Duration) -> Self {
        Self {
            max_concurrent,
            max_age,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Admit a new stream for `principal`, or reject with the number of
    /// streams currently active.
    ///
    /// Purges this principal's stale entries first, so a crashed stream that
    /// never released its slot stops counting once it ages out.
    pub fn admit(&self, principal: &str) -> Result<ConnectionGuard, usize> {
        let now = Utc::now();
        let mut windows = lock(&self.windows);
        let window = windows.entry(principal.to_string()).or_default();
        window.retain(|t| now.signed_duration_since(*t) < self.max_age);

        if window.len() >= self.max_concurrent {
            return Err(window.len());
        }

        window.push(now);
        Ok(ConnectionGuard {
            windows: Arc::clone(&self.windows),
            principal: principal.to_string(),
            token: now,
        })
    }

    /// Number of active (unexpired) streams for `principal`.
    pub fn active(&self, principal: &str) -> usize {
        let now = Utc::now();
        let windows = lock(&self.windows);
        windows
            .get(principal)
            .map(|w| {
                w.iter()
                    .filter(|t| now.signed_duration_since(**t) < self.max_age)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Releases one stream slot when dropped.
///
/// Removes exactly the timestamp recorded at admission (first match by
/// value), so concurrent streams from the same principal never release each
/// other's slots.
pub struct ConnectionGuard {
    windows: Windows,
    principal: String,
    token: Timestamp,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut windows = lock(&self.windows);
        if let Some(window) = windows.get_mut(&self.principal) {
            if let Some(pos) = window.iter().position(|t| *t == self.token) {
                window.remove(pos);
            }
            if window.is_empty() {
                windows.remove(&self.principal);
            }
        }
    }
}

fn lock(windows: &Windows) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Timestamp>>> {
    // A poisoned lock only means another stream task panicked mid-update;
    // the window data is still usable.
    windows.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
