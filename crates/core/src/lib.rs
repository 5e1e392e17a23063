//! Pure domain logic shared by every quarry crate.
//!
//! Validation rules, shared type aliases, and the workspace error type live
//! here with zero internal dependencies, so `db`, `progress`, `dispatch`,
//! and `api` can agree on them without depending on each other.

pub mod error;
pub mod job;
pub mod progress;
pub mod types;

pub use error::CoreError;
