//! Shared type aliases used across the workspace.

/// Opaque job identifier. A UUID v4 generated at submission, stored as text.
pub type JobId = String;

/// UTC timestamp attached to records, snapshots, and stream events.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
