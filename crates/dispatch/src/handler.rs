//! Handler trait and the operation registry.
//!
//! One handler implements one `(group, name)` operation. The registry is
//! assembled at startup, shared behind `Arc`, and never mutated afterwards,
//! so lookups on the dispatch path take no lock.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use quarry_core::types::JobId;
use quarry_db::DbPool;
use quarry_progress::ProgressStore;

// ---------------------------------------------------------------------------
// Handler contract
// ---------------------------------------------------------------------------

/// Everything a handler may touch while running one job.
///
/// The pool lets long-running handlers re-read their own row (for example to
/// notice a cancellation), and the progress store is where percent updates
/// land for streaming clients.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub params: serde_json::Value,
    pub pool: DbPool,
    pub progress: ProgressStore,
}

/// What a successful handler hands back to be recorded on the job row.
#[derive(Debug, Clone, Default)]
pub struct JobOutput {
    pub data: Option<serde_json::Value>,
    pub path: Option<String>,
}

/// A handler failure. The dispatcher maps this onto the job's failure
/// classification; handlers never write terminal states themselves.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("{0}")]
    Failed(String),
}

/// Result type for job handlers.
pub type HandlerResult = Result<JobOutput, HandlerError>;

/// Future type returned by job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// One runnable operation.
pub trait JobHandler: Send + Sync + 'static {
    fn run(&self, ctx: JobContext) -> HandlerFuture;
}

/// A function-based handler, for operations small enough that a dedicated
/// type would be noise.
pub struct FnHandler<F>
where
    F: Fn(JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    fn run(&self, ctx: JobContext) -> HandlerFuture {
        (self.handler)(ctx)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps `(group, name)` to the handler that runs it.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, String), Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for an operation, replacing any previous one.
    pub fn register<H>(&mut self, group: &str, name: &str, handler: H)
    where
        H: JobHandler,
    {
        self.handlers
            .insert((group.to_string(), name.to_string()), Arc::new(handler));
    }

    pub fn get(&self, group: &str, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers
            .get(&(group.to_string(), name.to_string()))
            .cloned()
    }

    pub fn contains(&self, group: &str, name: &str) -> bool {
        self.handlers
            .contains_key(&(group.to_string(), name.to_string()))
    }

    /// Registered operations, for diagnostics and submission validation.
    pub fn operations(&self) -> Vec<(String, String)> {
        self.handlers.keys().cloned().collect()
    }
}
