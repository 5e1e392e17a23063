//! Handlers for the `/jobs` resource.
//!
//! All endpoints require a caller identity via [`Principal`]. Callers only
//! ever see their own jobs; there is no admin override at this layer.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use quarry_core::error::CoreError;
use quarry_core::job::{validate_callback_headers, validate_callback_url, validate_operation_field};
use quarry_core::types::{JobId, Timestamp};
use quarry_db::models::job::{Job, JobListQuery, JobView, SubmitJob};
use quarry_db::models::status::JobStatus;
use quarry_db::repositories::job_repo::JobRepo;
use quarry_db::DbPool;

use crate::error::{AppError, AppResult};
use crate::middleware::principal::Principal;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a job by ID and verify the caller owns it.
///
/// Returns `NotFound` if the job does not exist, `Forbidden` if the caller
/// is not the owner. `action` is used in the error message (e.g. "view",
/// "cancel", "retry", "stream").
pub(crate) async fn find_and_authorize(
    pool: &DbPool,
    job_id: &str,
    principal: &Principal,
    action: &str,
) -> AppResult<Job> {
    let job = JobRepo::find_by_id(pool, job_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Job",
                id: job_id.to_string(),
            })
        })?;

    if job.principal != principal.id {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Cannot {action} another principal's job"
        ))));
    }

    Ok(job)
}

/// Validate submission fields before anything touches the database.
fn validate_submission(input: &SubmitJob) -> Result<(), CoreError> {
    validate_operation_field("group", &input.group)?;
    validate_operation_field("name", &input.name)?;
    if let Some(url) = &input.callback_url {
        validate_callback_url(url)?;
    }
    if let Some(headers) = &input.callback_headers {
        validate_callback_headers(headers)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// Body of a successful submission, pointing the caller at the follow-up
/// endpoints for this job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub stream_url: String,
    pub status_url: String,
}

impl From<&Job> for SubmitResponse {
    fn from(job: &Job) -> Self {
        SubmitResponse {
            job_id: job.id.clone(),
            status: job.status,
            created_at: job.created_at,
            stream_url: format!("/api/v1/jobs/{}/stream", job.id),
            status_url: format!("/api/v1/jobs/{}", job.id),
        }
    }
}

/// POST /api/v1/jobs
///
/// Submit a new background job. Returns 201 with the created job's id and
/// follow-up URLs. The job starts in `PENDING` status and will be picked up
/// by the dispatcher. Unknown operations are rejected before any row is
/// written.
pub async fn submit_job(
    principal: Principal,
    State(state): State<AppState>,
    Json(input): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    validate_submission(&input)?;

    if !state.registry.contains(&input.group, &input.name) {
        return Err(AppError::BadRequest(format!(
            "Unknown operation: {}/{}",
            input.group, input.name
        )));
    }

    let job = JobRepo::create(&state.pool, &principal.id, &input).await?;

    tracing::info!(
        job_id = %job.id,
        group = %job.op_group,
        name = %job.op_name,
        principal = %principal.id,
        "Job submitted",
    );

    Ok((StatusCode::CREATED, Json(SubmitResponse::from(&job))))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// List the caller's jobs, newest first. Supports optional `status`,
/// `limit`, and `offset` query parameters.
pub async fn list_jobs(
    principal: Principal,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = JobRepo::list_by_principal(&state.pool, &principal.id, &params).await?;
    let views: Vec<JobView> = jobs.into_iter().map(JobView::from).collect();

    Ok(Json(DataResponse { data: views }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Get a single job by ID. Callers can only view their own jobs.
pub async fn get_job(
    principal: Principal,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state.pool, &job_id, &principal, "view").await?;
    Ok(Json(JobView::from(job)))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Cancel a pending or running job. Returns 200 with the updated record;
/// 409 if the job is already in a terminal state. A successful cancel is
/// handed to the notification service like any other terminal transition.
pub async fn cancel_job(
    principal: Principal,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    find_and_authorize(&state.pool, &job_id, &principal, "cancel").await?;

    let cancelled = JobRepo::cancel(&state.pool, &job_id).await?;

    if !cancelled {
        return Err(AppError::Core(CoreError::InvalidTransition(
            "Job is already in a terminal state and cannot be cancelled".into(),
        )));
    }

    // The transition is committed; hand the job to the notification service.
    state.notifier.notify(job_id.clone());
    tracing::info!(job_id = %job_id, principal = %principal.id, "Job cancelled");

    let job = JobRepo::find_by_id(&state.pool, &job_id)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::NotFound {
                entity: "Job",
                id: job_id.clone(),
            })
        })?;

    Ok(Json(JobView::from(job)))
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/retry
///
/// Create a new job from a failed job's parameters. Only failed jobs can be
/// retried; the new job starts in `PENDING` status. This is the ONLY way to
/// retry a job; no automatic retry exists.
pub async fn retry_job(
    principal: Principal,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let original = find_and_authorize(&state.pool, &job_id, &principal, "retry").await?;

    if original.status != JobStatus::Failed {
        return Err(AppError::BadRequest(
            "Only failed jobs can be retried".into(),
        ));
    }

    let new_job = JobRepo::retry(&state.pool, &job_id).await?;

    tracing::info!(
        original_job_id = %job_id,
        new_job_id = %new_job.id,
        principal = %principal.id,
        "Job retried",
    );

    Ok((StatusCode::CREATED, Json(SubmitResponse::from(&new_job))))
}
