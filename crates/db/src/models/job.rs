//! Job entity models and DTOs for the async job execution engine.

use quarry_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{FailureKind, JobStatus};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: JobId,
    pub principal: String,
    pub op_group: String,
    pub op_name: String,
    pub parameters: serde_json::Value,
    pub status: JobStatus,
    pub progress_percent: i32,
    pub result_data: Option<serde_json::Value>,
    pub result_path: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub callback_url: Option<String>,
    pub callback_headers: Option<serde_json::Value>,
    pub webhook_response_status: Option<i32>,
    pub webhook_sent_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// DTO for submitting a new job via `POST /api/v1/jobs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJob {
    pub group: String,
    pub name: String,
    pub parameters: serde_json::Value,
    pub callback_url: Option<String>,
    pub callback_headers: Option<serde_json::Value>,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    /// Filter by status (e.g. `PENDING`, `FAILED`).
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Owner-facing projection of a [`Job`], serialized with the external
/// camelCase field names. Also the webhook payload body (plus the
/// delivery timestamp added by the notifier).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: i32,
    pub group: String,
    pub name: String,
    pub parameters: serde_json::Value,
    pub result_path: Option<String>,
    pub result_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        JobView {
            job_id: job.id,
            status: job.status,
            progress: job.progress_percent,
            group: job.op_group,
            name: job.op_name,
            parameters: job.parameters,
            result_path: job.result_path,
            result_data: job.result_data,
            error_message: job.error_message,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
