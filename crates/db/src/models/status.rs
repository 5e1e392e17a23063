//! Status and failure-classification enums stored as TEXT columns.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
///
/// Transitions are one-way: `Pending -> Running -> Completed | Failed`,
/// with `Cancelled` reachable from `Pending` or `Running`. Terminal
/// statuses accept no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Database/text form of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether this status accepts no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification recorded alongside the error message when a job fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// No handler was registered for the job's operation.
    ExecutableNotFound,
    /// The handler exceeded the per-job timeout and was terminated.
    Timeout,
    /// Catch-all for unexpected handler failures.
    UnknownError,
}

impl FailureKind {
    /// Database/text form of the classification.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ExecutableNotFound => "EXECUTABLE_NOT_FOUND",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
