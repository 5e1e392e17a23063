//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for the write paths
//! - Projection structs for the external API shapes

pub mod job;
pub mod status;
