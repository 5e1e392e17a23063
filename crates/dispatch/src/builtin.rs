//! Built-in diagnostics operations.

use tokio::time::{sleep, Duration};

use crate::handler::{HandlerError, HandlerFuture, JobContext, JobHandler, JobOutput};

pub const DIAGNOSTICS_GROUP: &str = "diagnostics";
pub const SLEEP_NAME: &str = "sleep";

const DEFAULT_DURATION_MS: u64 = 1000;
const DEFAULT_STEPS: u64 = 4;

/// Sleeps for `duration_ms` in `steps` equal increments, reporting progress
/// after each one. A cheap end-to-end probe for dispatch, progress streaming,
/// and delivery without any real workload.
pub struct SleepHandler;

impl JobHandler for SleepHandler {
    fn run(&self, ctx: JobContext) -> HandlerFuture {
        Box::pin(async move {
            let duration_ms = ctx
                .params
                .get("duration_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(DEFAULT_DURATION_MS);
            let steps = ctx
                .params
                .get("steps")
                .and_then(|v| v.as_u64())
                .unwrap_or(DEFAULT_STEPS)
                .max(1);

            for step in 1..=steps {
                sleep(Duration::from_millis(duration_ms / steps)).await;
                let percent = (step * 100 / steps) as i32;
                let message = format!("Slept step {step} of {steps}");
                ctx.progress
                    .update(&ctx.job_id, percent, &message, None)
                    .await
                    .map_err(|e| HandlerError::Failed(e.to_string()))?;
            }

            Ok(JobOutput {
                data: Some(serde_json::json!({ "slept_ms": duration_ms })),
                path: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerResult;

    async fn run_sleep(params: serde_json::Value) -> (JobContext, HandlerResult) {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        let ctx = JobContext {
            job_id: "job-1".to_string(),
            params,
            pool,
            progress: quarry_progress::ProgressStore::in_memory(Duration::from_secs(60)),
        };
        let result = SleepHandler.run(ctx.clone()).await;
        (ctx, result)
    }

    #[tokio::test]
    async fn reports_progress_per_step_and_returns_slept_ms() {
        let (ctx, result) =
            run_sleep(serde_json::json!({ "duration_ms": 20, "steps": 2 })).await;

        let output = result.unwrap();
        assert_eq!(
            output.data,
            Some(serde_json::json!({ "slept_ms": 20 }))
        );
        let snapshot = ctx.progress.get("job-1").await.unwrap().unwrap();
        assert_eq!(snapshot.percent, 100);
        assert_eq!(snapshot.message, "Slept step 2 of 2");
    }

    #[tokio::test]
    async fn zero_steps_is_clamped_to_one() {
        let (ctx, result) =
            run_sleep(serde_json::json!({ "duration_ms": 10, "steps": 0 })).await;

        assert!(result.is_ok());
        let snapshot = ctx.progress.get("job-1").await.unwrap().unwrap();
        assert_eq!(snapshot.percent, 100);
    }
}
