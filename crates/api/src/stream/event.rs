//! Wire shapes for the SSE stream.
//!
//! Every frame is an independently-parseable JSON object; consumers ignore
//! unknown fields and stop reading after a closing event (terminal, timeout,
//! disconnect, or error).

use axum::response::sse;
use chrono::Utc;
use serde::Serialize;

use quarry_core::types::Timestamp;
use quarry_db::models::job::Job;
use quarry_db::models::status::JobStatus;
use quarry_progress::ProgressSnapshot;

/// One event on a job's progress stream.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    /// The job's reported progress changed.
    Progress {
        percent: u8,
        message: String,
        timestamp: Timestamp,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },
    /// The job reached a terminal status. Always the last data-bearing
    /// event; at most one per stream.
    Terminal {
        done: bool,
        status: JobStatus,
        progress: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        result_data: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result_path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        timestamp: Timestamp,
    },
    /// The stream hit its maximum duration without a terminal status.
    Timeout {
        timeout: bool,
        message: String,
        timestamp: Timestamp,
    },
    /// The client went away mid-stream (best-effort; usually undeliverable).
    Disconnect {
        disconnected: bool,
        timestamp: Timestamp,
    },
    /// The stream loop hit an unexpected internal error.
    Error {
        error: bool,
        message: String,
        timestamp: Timestamp,
    },
}

impl StreamEvent {
    pub fn progress(snapshot: &ProgressSnapshot) -> Self {
        StreamEvent::Progress {
            percent: snapshot.percent,
            message: snapshot.message.clone(),
            timestamp: snapshot.timestamp,
            metadata: snapshot.metadata.clone(),
        }
    }

    pub fn terminal(job: &Job) -> Self {
        StreamEvent::Terminal {
            done: true,
            status: job.status,
            progress: job.progress_percent,
            result_data: job.result_data.clone(),
            result_path: job.result_path.clone(),
            error_message: job.error_message.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn timeout(max_duration_secs: u64) -> Self {
        StreamEvent::Timeout {
            timeout: true,
            message: format!("Stream reached the maximum duration of {max_duration_secs}s"),
            timestamp: Utc::now(),
        }
    }

    pub fn disconnect() -> Self {
        StreamEvent::Disconnect {
            disconnected: true,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: &str) -> Self {
        StreamEvent::Error {
            error: true,
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Render as an SSE frame (`data: <json>\n\n` on the wire).
    pub fn to_sse(&self) -> Result<sse::Event, axum::Error> {
        sse::Event::default().json_data(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
