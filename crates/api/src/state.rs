use std::sync::Arc;

use quarry_dispatch::HandlerRegistry;
use quarry_notify::NotifyHandle;
use quarry_progress::ProgressStore;

use crate::config::ServerConfig;
use crate::stream::limiter::StreamLimiter;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: quarry_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Ephemeral progress snapshots, read by the streaming gateway.
    pub progress: ProgressStore,
    /// Registered operations, consulted at submission time.
    pub registry: Arc<HandlerRegistry>,
    /// Hands terminal job ids to the notification service.
    pub notifier: NotifyHandle,
    /// Per-principal concurrent stream accounting.
    pub stream_limiter: StreamLimiter,
}
