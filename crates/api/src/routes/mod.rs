pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                 list, submit (GET, POST)
/// /jobs/{id}            get job (GET)
/// /jobs/{id}/cancel     cancel job (POST)
/// /jobs/{id}/retry      retry failed job (POST)
/// /jobs/{id}/stream     progress stream, SSE (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/jobs", jobs::router())
}
