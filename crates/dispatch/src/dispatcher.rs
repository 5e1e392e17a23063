//! The claim-and-execute loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use quarry_db::models::job::Job;
use quarry_db::models::status::FailureKind;
use quarry_db::repositories::job_repo::JobRepo;
use quarry_db::DbPool;
use quarry_notify::NotifyHandle;
use quarry_progress::ProgressStore;

use crate::handler::{HandlerError, HandlerRegistry, JobContext};

const DEFAULT_MAX_CONCURRENT: usize = 4;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for the dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on handlers running at the same time.
    pub max_concurrent: usize,
    /// Pause between claim sweeps.
    pub poll_interval: Duration,
    /// Hard wall-clock limit for a single handler run.
    pub job_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Claims pending jobs and runs their handlers.
///
/// Concurrency is bounded by a semaphore sized to `max_concurrent`; a sweep
/// stops claiming as soon as no permit is free, leaving the remaining pending
/// rows for a later sweep. Each claimed job holds its permit until the handler
/// reaches a terminal state, so a full pool naturally pauses pickup without
/// blocking the loop.
#[derive(Clone)]
pub struct JobDispatcher {
    pool: DbPool,
    progress: ProgressStore,
    registry: Arc<HandlerRegistry>,
    notifier: NotifyHandle,
    config: DispatcherConfig,
    semaphore: Arc<Semaphore>,
}

impl JobDispatcher {
    pub fn new(
        pool: DbPool,
        progress: ProgressStore,
        registry: Arc<HandlerRegistry>,
        notifier: NotifyHandle,
        config: DispatcherConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            pool,
            progress,
            registry,
            notifier,
            config,
            semaphore,
        }
    }

    /// Runs claim sweeps until `cancel` fires.
    ///
    /// Cancellation stops pickup only; jobs already claimed keep running on
    /// their spawned tasks and commit their terminal states independently.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            max_concurrent = self.config.max_concurrent,
            job_timeout_secs = self.config.job_timeout.as_secs(),
            "Job dispatcher started"
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job dispatcher stopped");
                    break;
                }
                _ = interval.tick() => {
                    let started = self.poll_once().await;
                    if started > 0 {
                        tracing::debug!(started, "Claimed pending jobs");
                    }
                }
            }
        }
    }

    /// One sweep: claims pending jobs while worker slots are free.
    ///
    /// Returns how many jobs were started. Claimed jobs run on spawned tasks;
    /// the sweep itself never waits for a handler.
    pub async fn poll_once(&self) -> usize {
        let mut started = 0;
        loop {
            // Permit is released when the spawned task drops it.
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                break;
            };
            match JobRepo::claim_next(&self.pool).await {
                Ok(Some(job)) => {
                    started += 1;
                    let dispatcher = self.clone();
                    tokio::spawn(async move {
                        dispatcher.execute(job).await;
                        drop(permit);
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim next job");
                    break;
                }
            }
        }
        started
    }

    /// Runs one claimed job to a terminal state.
    async fn execute(&self, job: Job) {
        let Some(handler) = self.registry.get(&job.op_group, &job.op_name) else {
            let message = format!(
                "No handler registered for {}/{}",
                job.op_group, job.op_name
            );
            self.finish_failed(&job.id, &message, FailureKind::ExecutableNotFound)
                .await;
            return;
        };

        tracing::info!(
            job_id = %job.id,
            group = %job.op_group,
            name = %job.op_name,
            "Executing job"
        );

        let ctx = JobContext {
            job_id: job.id.clone(),
            params: job.parameters.clone(),
            pool: self.pool.clone(),
            progress: self.progress.clone(),
        };

        // On expiry the handler future is dropped, halting its execution at
        // the next await point.
        match tokio::time::timeout(self.config.job_timeout, handler.run(ctx)).await {
            Ok(Ok(output)) => {
                self.finish_completed(&job.id, output.data.as_ref(), output.path.as_deref())
                    .await;
            }
            Ok(Err(err)) => {
                let kind = match &err {
                    HandlerError::ExecutableNotFound(_) => FailureKind::ExecutableNotFound,
                    HandlerError::Failed(_) => FailureKind::UnknownError,
                };
                self.finish_failed(&job.id, &err.to_string(), kind).await;
            }
            Err(_) => {
                let message = format!(
                    "Job timed out after {}s",
                    self.config.job_timeout.as_secs()
                );
                self.finish_failed(&job.id, &message, FailureKind::Timeout).await;
            }
        }
    }

    async fn finish_completed(
        &self,
        job_id: &str,
        result_data: Option<&serde_json::Value>,
        result_path: Option<&str>,
    ) {
        match JobRepo::complete(&self.pool, job_id, result_data, result_path).await {
            Ok(true) => {
                if let Err(e) = self.progress.complete(job_id).await {
                    tracing::warn!(job_id, error = %e, "Failed to record completion progress");
                }
                tracing::info!(job_id, "Job completed");
                self.notifier.notify(job_id.to_string());
            }
            Ok(false) => {
                tracing::debug!(job_id, "Job no longer running, completion discarded");
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to record job completion");
            }
        }
    }

    async fn finish_failed(&self, job_id: &str, message: &str, kind: FailureKind) {
        match JobRepo::fail(&self.pool, job_id, message, kind).await {
            Ok(true) => {
                if let Err(e) = self.progress.fail(job_id, message).await {
                    tracing::warn!(job_id, error = %e, "Failed to record failure progress");
                }
                tracing::warn!(job_id, kind = %kind.as_str(), error = message, "Job failed");
                self.notifier.notify(job_id.to_string());
            }
            Ok(false) => {
                tracing::debug!(job_id, "Job already terminal, failure discarded");
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to record job failure");
            }
        }
    }
}
