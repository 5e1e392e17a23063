//! Shared helpers for API integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tower::ServiceExt;

use quarry_api::config::ServerConfig;
use quarry_api::middleware::principal::PRINCIPAL_HEADER;
use quarry_api::router::build_app_router;
use quarry_api::state::AppState;
use quarry_api::stream::limiter::StreamLimiter;
use quarry_core::types::JobId;
use quarry_dispatch::builtin::{SleepHandler, DIAGNOSTICS_GROUP, SLEEP_NAME};
use quarry_dispatch::HandlerRegistry;
use quarry_notify::NotificationService;
use quarry_progress::ProgressStore;

/// Principal id used by most tests.
pub const PRINCIPAL: &str = "acct-test-1";

/// Build a test `ServerConfig` with fast streaming settings.
///
/// Streams poll every 50ms and hit their duration wall after 2 seconds,
/// so tests that ride a stream to its timeout finish quickly.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_concurrent_jobs: 4,
        job_timeout_secs: 60,
        poll_interval_ms: 50,
        stream_max_duration_secs: 2,
        stream_poll_interval_ms: 50,
        max_streams_per_principal: 3,
        progress_ttl_secs: 60,
    }
}

/// The wired application plus the shared pieces tests poke at directly.
///
/// `progress` is the same store the stream handlers read, so tests can
/// inject snapshots without running the dispatcher. `notify_rx` is the
/// receiving half of the webhook handoff channel; holding it open lets
/// tests assert which jobs were queued for delivery.
pub struct TestApp {
    pub router: Router,
    pub progress: ProgressStore,
    pub notify_rx: mpsc::UnboundedReceiver<JobId>,
}

/// Build the full application with the default test configuration.
///
/// This goes through `build_app_router` so integration tests exercise the
/// same middleware stack (CORS, request ID, timeout, tracing, panic
/// recovery) that production uses. The dispatcher and notifier loops are
/// not started; tests drive job state through `JobRepo` directly.
pub fn build_test_app(pool: SqlitePool) -> TestApp {
    build_test_app_with(pool, test_config())
}

/// Same as [`build_test_app`] but with a caller-supplied configuration.
pub fn build_test_app_with(pool: SqlitePool, config: ServerConfig) -> TestApp {
    let progress = ProgressStore::in_memory(Duration::from_secs(config.progress_ttl_secs));

    let mut registry = HandlerRegistry::new();
    registry.register(DIAGNOSTICS_GROUP, SLEEP_NAME, SleepHandler);

    let (notifier, notify_rx) = NotificationService::channel();

    let stream_limiter = StreamLimiter::new(
        config.max_streams_per_principal,
        chrono::Duration::seconds(config.stream_max_duration_secs as i64),
    );

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        progress: progress.clone(),
        registry: Arc::new(registry),
        notifier,
        stream_limiter,
    };

    TestApp {
        router: build_app_router(state, &config),
        progress,
        notify_rx,
    }
}

/// Send a GET request without a principal header.
pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a GET request identified as `principal`.
pub async fn get_as(app: Router, uri: &str, principal: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(PRINCIPAL_HEADER, principal)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body, identified as `principal`.
pub async fn post_json_as(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    principal: &str,
) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(PRINCIPAL_HEADER, principal)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a bodyless POST request, identified as `principal`.
pub async fn post_as(app: Router, uri: &str, principal: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(PRINCIPAL_HEADER, principal)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read response body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("response body should be valid JSON")
}

/// Collect a response body as a UTF-8 string.
pub async fn body_text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read response body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("response body should be valid UTF-8")
}

/// Collect an SSE response body and parse every `data:` line as JSON.
///
/// Only works for streams that terminate on their own (every stream in
/// these tests ends with a closing event), otherwise collecting the body
/// would never return. Keep-alive comment lines are skipped.
pub async fn sse_events(response: Response) -> Vec<serde_json::Value> {
    let text = body_text(response).await;
    text.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).expect("SSE data line should be valid JSON"))
        .collect()
}

/// Submit a diagnostics/sleep job for `principal` and return its id.
pub async fn submit_sleep_job(app: &Router, principal: &str) -> String {
    let body = serde_json::json!({
        "group": DIAGNOSTICS_GROUP,
        "name": SLEEP_NAME,
        "parameters": { "duration_ms": 50, "steps": 1 }
    });
    let response = post_json_as(app.clone(), "/api/v1/jobs", body, principal).await;
    assert_eq!(
        response.status(),
        axum::http::StatusCode::CREATED,
        "sleep job submission should succeed"
    );
    let json = body_json(response).await;
    json["jobId"]
        .as_str()
        .expect("jobId should be a string")
        .to_string()
}
