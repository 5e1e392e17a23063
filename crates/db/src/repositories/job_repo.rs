//! Repository for the `jobs` table.
//!
//! Every status transition is a guarded UPDATE: the `WHERE` clause names
//! the statuses the transition is legal from, and `rows_affected` tells the
//! caller whether it applied. Two racing transitions can therefore never
//! stack inconsistent terminal states onto the same job.

use chrono::Utc;
use quarry_core::types::Timestamp;
use uuid::Uuid;

use crate::models::job::{Job, JobListQuery, SubmitJob};
use crate::models::status::{FailureKind, JobStatus};
use crate::DbPool;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, principal, op_group, op_name, parameters, status, \
    progress_percent, result_data, result_path, error_message, error_kind, \
    callback_url, callback_headers, webhook_response_status, webhook_sent_at, \
    created_at, started_at, completed_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Terminal statuses: completed, failed, cancelled.
const TERMINAL_STATUSES: [JobStatus; 3] = [
    JobStatus::Completed,
    JobStatus::Failed,
    JobStatus::Cancelled,
];

/// Provides CRUD operations and status transitions for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Create a new pending job owned by `principal`.
    pub async fn create(
        pool: &DbPool,
        principal: &str,
        input: &SubmitJob,
    ) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs \
                 (id, principal, op_group, op_name, parameters, status, \
                  progress_percent, callback_url, callback_headers, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(Uuid::new_v4().to_string())
            .bind(principal)
            .bind(&input.group)
            .bind(&input.name)
            .bind(&input.parameters)
            .bind(JobStatus::Pending)
            .bind(&input.callback_url)
            .bind(&input.callback_headers)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest pending job.
    ///
    /// Moves it to `Running` and stamps `started_at`. SQLite serializes
    /// writers, so the UPDATE-of-subselect cannot double-dispatch.
    pub async fn claim_next(pool: &DbPool) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = ?1, started_at = ?2 \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = ?3 \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Running)
            .bind(Utc::now())
            .bind(JobStatus::Pending)
            .fetch_optional(pool)
            .await
    }

    /// Mark a running job as completed with its result attached.
    ///
    /// Forces `progress_percent` to 100 and stamps `completed_at`. Returns
    /// `false` if the job was no longer `Running` (e.g. cancelled while the
    /// handler was finishing), in which case nothing is written.
    pub async fn complete(
        pool: &DbPool,
        job_id: &str,
        result_data: Option<&serde_json::Value>,
        result_path: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?1, result_data = ?2, result_path = ?3, \
                 progress_percent = 100, completed_at = ?4 \
             WHERE id = ?5 AND status = ?6",
        )
        .bind(JobStatus::Completed)
        .bind(result_data)
        .bind(result_path)
        .bind(Utc::now())
        .bind(job_id)
        .bind(JobStatus::Running)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a job as failed with an error message and classification.
    ///
    /// Legal from `Pending` (dispatch-time fail-fast) and `Running`. No
    /// automatic retry is performed. The job stays `Failed` until the
    /// caller explicitly retries via `POST /jobs/{id}/retry`.
    pub async fn fail(
        pool: &DbPool,
        job_id: &str,
        error: &str,
        kind: FailureKind,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?1, error_message = ?2, error_kind = ?3, completed_at = ?4 \
             WHERE id = ?5 AND status IN (?6, ?7)",
        )
        .bind(JobStatus::Failed)
        .bind(error)
        .bind(kind)
        .bind(Utc::now())
        .bind(job_id)
        .bind(JobStatus::Pending)
        .bind(JobStatus::Running)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel a job if it is not already in a terminal state.
    ///
    /// Returns `true` if the job was cancelled, `false` if it was already
    /// completed, failed, or cancelled.
    pub async fn cancel(pool: &DbPool, job_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?1, completed_at = ?2 \
             WHERE id = ?3 AND status NOT IN (?4, ?5, ?6)",
        )
        .bind(JobStatus::Cancelled)
        .bind(Utc::now())
        .bind(job_id)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Create a new pending job from a failed job's parameters.
    ///
    /// This is the ONLY way to retry a failed job. No automatic retries
    /// exist anywhere in the engine.
    pub async fn retry(pool: &DbPool, job_id: &str) -> Result<Job, sqlx::Error> {
        let original = Self::find_by_id(pool, job_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let input = SubmitJob {
            group: original.op_group,
            name: original.op_name,
            parameters: original.parameters,
            callback_url: original.callback_url,
            callback_headers: original.callback_headers,
        };
        Self::create(pool, &original.principal, &input).await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &DbPool, id: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a principal's jobs with optional status filter and pagination.
    pub async fn list_by_principal(
        pool: &DbPool,
        principal: &str,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions = vec!["principal = ?1".to_string()];
        let mut bind_idx: u32 = 2;

        if params.status.is_some() {
            conditions.push(format!("status = ?{bind_idx}"));
            bind_idx += 1;
        }

        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE {} \
             ORDER BY created_at DESC \
             LIMIT ?{bind_idx} OFFSET ?{}",
            conditions.join(" AND "),
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, Job>(&query).bind(principal);

        if let Some(status) = params.status {
            q = q.bind(status);
        }

        q = q.bind(limit).bind(offset);

        q.fetch_all(pool).await
    }

    /// Record the webhook delivery outcome for a job.
    ///
    /// `response_status` 0 means every attempt failed at the transport
    /// level. The write applies at most once per job and never touches the
    /// job's own status.
    pub async fn record_webhook_result(
        pool: &DbPool,
        job_id: &str,
        response_status: i32,
        sent_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET webhook_response_status = ?1, webhook_sent_at = ?2 \
             WHERE id = ?3 AND webhook_response_status IS NULL",
        )
        .bind(response_status)
        .bind(sent_at)
        .bind(job_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete terminal jobs whose `completed_at` is older than `age` ago.
    ///
    /// Returns the number of rows removed. Non-terminal jobs are never
    /// touched, however old.
    pub async fn purge_older_than(
        pool: &DbPool,
        age: chrono::Duration,
    ) -> Result<u64, sqlx::Error> {
        let cutoff = Utc::now() - age;
        let result = sqlx::query(
            "DELETE FROM jobs \
             WHERE status IN (?1, ?2, ?3) AND completed_at < ?4",
        )
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
