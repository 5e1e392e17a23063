//! Job pickup and execution.
//!
//! The dispatcher polls the jobs table for pending work, claims one row at a
//! time, and runs the matching handler under a concurrency bound and a hard
//! per-job timeout. Terminal transitions are committed through `quarry-db`
//! before the notifier is told about them, so a delivered webhook always
//! describes a state that is already durable.

pub mod builtin;
pub mod dispatcher;
pub mod handler;

pub use dispatcher::{DispatcherConfig, JobDispatcher};
pub use handler::{
    FnHandler, HandlerError, HandlerFuture, HandlerRegistry, HandlerResult, JobContext, JobHandler,
    JobOutput,
};
