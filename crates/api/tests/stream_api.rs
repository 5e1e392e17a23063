//! Integration tests for the SSE progress stream endpoint.
//!
//! Every stream in these tests ends with a closing event (terminal or
//! timeout), so collecting the whole response body is safe and yields the
//! full event sequence. Job state transitions are driven through `JobRepo`
//! and the shared progress store instead of a running dispatcher.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{body_json, get_as, sse_events, PRINCIPAL};
use quarry_db::models::status::FailureKind;
use quarry_db::repositories::job_repo::JobRepo;
use serde_json::json;
use sqlx::SqlitePool;
use tokio::time::sleep;

fn stream_uri(job_id: &str) -> String {
    format!("/api/v1/jobs/{job_id}/stream")
}

// ---------------------------------------------------------------------------
// Test 1: A completed job streams its progress and exactly one terminal event
// ---------------------------------------------------------------------------

/// With a progress snapshot present and the job already completed, the
/// stream emits the snapshot, then the terminal event, then closes.
#[sqlx::test(migrations = "../db/migrations")]
async fn completed_job_streams_progress_then_single_terminal_event(pool: SqlitePool) {
    let app = common::build_test_app(pool.clone());
    let job_id = common::submit_sleep_job(&app.router, PRINCIPAL).await;

    app.progress
        .update(&job_id, 50, "Halfway", None)
        .await
        .unwrap();
    JobRepo::claim_next(&pool).await.unwrap().expect("claim");
    assert!(
        JobRepo::complete(&pool, &job_id, Some(&json!({ "slept_ms": 100 })), None)
            .await
            .unwrap()
    );

    let response = get_as(app.router, &stream_uri(&job_id), PRINCIPAL).await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(
        content_type.starts_with("text/event-stream"),
        "unexpected content type: {content_type}"
    );

    let events = sse_events(response).await;
    assert_eq!(events.len(), 2, "expected progress + terminal, got {events:?}");

    assert_eq!(events[0]["percent"], 50);
    assert_eq!(events[0]["message"], "Halfway");

    assert_eq!(events[1]["done"], true);
    assert_eq!(events[1]["status"], "COMPLETED");
    assert_eq!(events[1]["progress"], 100);
    assert_eq!(events[1]["result_data"], json!({ "slept_ms": 100 }));
    assert!(events[1]["timestamp"].is_string());

    // Exactly one terminal event per stream.
    let terminal_count = events.iter().filter(|e| e["done"] == true).count();
    assert_eq!(terminal_count, 1);
}

// ---------------------------------------------------------------------------
// Test 2: A failed job's terminal event carries the error message
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn failed_job_terminal_event_carries_error(pool: SqlitePool) {
    let app = common::build_test_app(pool.clone());
    let job_id = common::submit_sleep_job(&app.router, PRINCIPAL).await;

    JobRepo::claim_next(&pool).await.unwrap().expect("claim");
    assert!(
        JobRepo::fail(&pool, &job_id, "boom", FailureKind::UnknownError)
            .await
            .unwrap()
    );
    app.progress.fail(&job_id, "boom").await.unwrap();

    let response = get_as(app.router, &stream_uri(&job_id), PRINCIPAL).await;
    let events = sse_events(response).await;

    // The failure snapshot streams first, then the terminal event.
    assert_eq!(events.len(), 2, "expected progress + terminal, got {events:?}");
    assert_eq!(events[0]["percent"], 0);
    assert_eq!(events[0]["message"], "Failed: boom");
    assert_eq!(events[0]["metadata"]["failed"], true);

    assert_eq!(events[1]["done"], true);
    assert_eq!(events[1]["status"], "FAILED");
    assert_eq!(events[1]["error_message"], "boom");
    assert!(events[1].get("result_data").is_none());
}

// ---------------------------------------------------------------------------
// Test 3: A job that is already terminal yields one immediate event
// ---------------------------------------------------------------------------

/// Subscribing after the job finished does not hang or replay progress;
/// the stream sends the terminal event and closes.
#[sqlx::test(migrations = "../db/migrations")]
async fn already_terminal_job_yields_single_immediate_event(pool: SqlitePool) {
    let app = common::build_test_app(pool);
    let job_id = common::submit_sleep_job(&app.router, PRINCIPAL).await;

    let response = common::post_as(
        app.router.clone(),
        &format!("/api/v1/jobs/{job_id}/cancel"),
        PRINCIPAL,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_as(app.router, &stream_uri(&job_id), PRINCIPAL).await;
    let events = sse_events(response).await;

    assert_eq!(events.len(), 1, "expected only the terminal event, got {events:?}");
    assert_eq!(events[0]["done"], true);
    assert_eq!(events[0]["status"], "CANCELLED");
    assert!(events[0].get("error_message").is_none());
}

// ---------------------------------------------------------------------------
// Test 4: Progress reported mid-stream is forwarded in order
// ---------------------------------------------------------------------------

/// Drives progress updates and completion while the stream is open and
/// checks the events arrive in reported order with the terminal last.
#[sqlx::test(migrations = "../db/migrations")]
async fn progress_updates_mid_stream_arrive_in_order(pool: SqlitePool) {
    let app = common::build_test_app(pool.clone());
    let job_id = common::submit_sleep_job(&app.router, PRINCIPAL).await;

    let driver = {
        let pool = pool.clone();
        let progress = app.progress.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            progress.update(&job_id, 30, "Step 1", None).await.unwrap();
            sleep(Duration::from_millis(150)).await;
            progress.update(&job_id, 60, "Step 2", None).await.unwrap();
            sleep(Duration::from_millis(150)).await;
            JobRepo::claim_next(&pool).await.unwrap().expect("claim");
            JobRepo::complete(&pool, &job_id, Some(&json!({ "ok": true })), None)
                .await
                .unwrap();
        })
    };

    let response = get_as(app.router, &stream_uri(&job_id), PRINCIPAL).await;
    let events = sse_events(response).await;
    driver.await.unwrap();

    let last = events.last().expect("stream should emit events");
    assert_eq!(last["done"], true);
    assert_eq!(last["status"], "COMPLETED");

    // Progress events precede the terminal one and never go backwards.
    let percents: Vec<i64> = events[..events.len() - 1]
        .iter()
        .map(|e| e["percent"].as_i64().expect("progress event percent"))
        .collect();
    assert!(!percents.is_empty(), "expected progress events, got {events:?}");
    assert!(
        percents.windows(2).all(|w| w[0] < w[1]),
        "percents should increase: {percents:?}"
    );
    assert!(percents.iter().all(|p| *p == 30 || *p == 60));
}

// ---------------------------------------------------------------------------
// Test 5: A stream with no terminal status ends with a timeout event
// ---------------------------------------------------------------------------

/// The job stays pending the whole time, so the stream runs into its
/// maximum duration (2s under the test config) and closes with a timeout
/// event.
#[sqlx::test(migrations = "../db/migrations")]
async fn stream_without_terminal_ends_with_timeout_event(pool: SqlitePool) {
    let app = common::build_test_app(pool);
    let job_id = common::submit_sleep_job(&app.router, PRINCIPAL).await;

    let response = get_as(app.router, &stream_uri(&job_id), PRINCIPAL).await;
    let events = sse_events(response).await;

    assert_eq!(events.len(), 1, "expected only the timeout event, got {events:?}");
    assert_eq!(events[0]["timeout"], true);
    assert!(events[0]["message"]
        .as_str()
        .unwrap()
        .contains("maximum duration"));
}

// ---------------------------------------------------------------------------
// Test 6: The fourth concurrent stream per principal is rejected with 429
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn fourth_concurrent_stream_returns_429(pool: SqlitePool) {
    let app = common::build_test_app(pool);
    let job_id = common::submit_sleep_job(&app.router, PRINCIPAL).await;

    // Three streams on the same pending job stay open in the background.
    let mut held = Vec::new();
    for _ in 0..3 {
        let response = get_as(app.router.clone(), &stream_uri(&job_id), PRINCIPAL).await;
        assert_eq!(response.status(), StatusCode::OK);
        held.push(response);
    }

    let response = get_as(app.router.clone(), &stream_uri(&job_id), PRINCIPAL).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Too many concurrent streams");
    assert_eq!(json["active_connections"], 3);
    assert_eq!(json["detail"], "Principal has 3 active streams; limit is 3");

    // Another principal is unaffected by this principal's streams.
    let other_job = common::submit_sleep_job(&app.router, "acct-other").await;
    let response = get_as(app.router, &stream_uri(&other_job), "acct-other").await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Test 7: Ownership checks run before any stream slot is taken
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn stream_is_refused_for_foreign_and_unknown_jobs(pool: SqlitePool) {
    let app = common::build_test_app(pool);
    let job_id = common::submit_sleep_job(&app.router, PRINCIPAL).await;

    let response = get_as(app.router.clone(), &stream_uri(&job_id), "acct-other").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Cannot stream another principal's job");

    let response = get_as(app.router, &stream_uri("no-such-job"), PRINCIPAL).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
