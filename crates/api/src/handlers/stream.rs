//! SSE handler for `/jobs/{id}/stream`.
//!
//! The handler authorizes the caller, takes a slot from the stream limiter,
//! and spawns a polling loop that feeds an unbounded channel; the channel is
//! wrapped as the SSE response body. The limiter slot is tied to the loop
//! task via [`ConnectionGuard`], so it is released whether the stream ends
//! with a terminal event, a timeout, an error, or a client disconnect.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use quarry_db::repositories::job_repo::JobRepo;

use crate::error::{AppError, AppResult};
use crate::handlers::jobs::find_and_authorize;
use crate::middleware::principal::Principal;
use crate::state::AppState;
use crate::stream::event::StreamEvent;
use crate::stream::limiter::ConnectionGuard;

type EventSender = mpsc::UnboundedSender<Result<Event, Infallible>>;

/// GET /api/v1/jobs/{id}/stream
///
/// Stream a job's progress as server-sent events until it reaches a terminal
/// status, the stream hits its maximum duration, or the client goes away.
/// Rejected with 429 when the principal is already at its concurrent-stream
/// limit.
pub async fn stream_job(
    principal: Principal,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    find_and_authorize(&state.pool, &job_id, &principal, "stream").await?;

    let guard = state
        .stream_limiter
        .admit(&principal.id)
        .map_err(|active_connections| AppError::RateLimited {
            active_connections,
            limit: state.config.max_streams_per_principal,
        })?;

    tracing::debug!(job_id = %job_id, principal = %principal.id, "Stream opened");

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_stream_loop(state.clone(), job_id, tx, guard));

    Ok(Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// The polling loop behind one stream.
///
/// Each iteration has three phases: emit a progress event if the snapshot's
/// percent moved, re-read the job record fresh, and emit exactly one terminal
/// event (after any pending progress event) if the job finished. The loop
/// owns the limiter slot for its whole life via `_guard`.
async fn run_stream_loop(
    state: AppState,
    job_id: String,
    tx: EventSender,
    _guard: ConnectionGuard,
) {
    let max_duration = Duration::from_secs(state.config.stream_max_duration_secs);
    let poll_interval = Duration::from_millis(state.config.stream_poll_interval_ms);
    let started = tokio::time::Instant::now();
    let mut last_percent: Option<u8> = None;

    while started.elapsed() < max_duration {
        // Phase 1: progress delta since the last emitted event.
        match state.progress.get(&job_id).await {
            Ok(Some(snapshot)) => {
                if last_percent != Some(snapshot.percent) {
                    last_percent = Some(snapshot.percent);
                    if send(&tx, StreamEvent::progress(&snapshot)).is_err() {
                        client_gone(&tx, &job_id);
                        return;
                    }
                }
            }
            // No snapshot yet (job still pending, or TTL expired).
            Ok(None) => {}
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Progress read failed mid-stream");
                let _ = send(&tx, StreamEvent::error("Progress store unavailable"));
                return;
            }
        }

        // Phases 2 and 3: fresh job read; exactly one terminal event.
        match JobRepo::find_by_id(&state.pool, &job_id).await {
            Ok(Some(job)) if job.status.is_terminal() => {
                if send(&tx, StreamEvent::terminal(&job)).is_err() {
                    client_gone(&tx, &job_id);
                }
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "Job disappeared mid-stream");
                let _ = send(&tx, StreamEvent::error("Job no longer exists"));
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job read failed mid-stream");
                let _ = send(&tx, StreamEvent::error("Job record unavailable"));
                return;
            }
        }

        tokio::time::sleep(poll_interval).await;
    }

    tracing::debug!(job_id = %job_id, "Stream reached maximum duration");
    let _ = send(
        &tx,
        StreamEvent::timeout(state.config.stream_max_duration_secs),
    );
}

/// Serialize and send one event; `Err` means the receiver is gone.
fn send(tx: &EventSender, event: StreamEvent) -> Result<(), ()> {
    match event.to_sse() {
        Ok(frame) => tx.send(Ok(frame)).map_err(|_| ()),
        Err(e) => {
            // Unserializable events are dropped rather than killing the stream.
            tracing::error!(error = %e, "Failed to serialize stream event");
            Ok(())
        }
    }
}

/// Best-effort disconnect event; the channel is usually already closed.
fn client_gone(tx: &EventSender, job_id: &str) {
    let _ = send(tx, StreamEvent::disconnect());
    tracing::debug!(job_id, "Stream client disconnected");
}
