//! Background notification service.
//!
//! [`NotificationService`] drains a channel of job ids whose terminal
//! transition has already committed, delivers the webhook for each, and
//! writes the delivery outcome back onto the job record. Every failure is
//! contained here: a dead receiver endpoint can never flip a completed job
//! to failed or crash the loop.

use quarry_core::types::JobId;
use quarry_db::repositories::job_repo::JobRepo;
use quarry_db::DbPool;
use tokio::sync::mpsc;

use crate::webhook::WebhookClient;

/// Cloneable sender half used by the dispatcher and the API cancel path.
#[derive(Clone)]
pub struct NotifyHandle {
    tx: mpsc::UnboundedSender<JobId>,
}

impl NotifyHandle {
    /// Queue a terminal job for notification. Non-blocking; call only
    /// after the status transition has committed.
    pub fn notify(&self, job_id: JobId) {
        if self.tx.send(job_id).is_err() {
            tracing::warn!("Notification service is gone, dropping delivery request");
        }
    }
}

/// Background service that delivers webhooks for terminal jobs.
pub struct NotificationService;

impl NotificationService {
    /// Create the handoff channel. The receiver half goes to [`run`],
    /// the handle to everyone who finishes jobs.
    ///
    /// [`run`]: NotificationService::run
    pub fn channel() -> (NotifyHandle, mpsc::UnboundedReceiver<JobId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (NotifyHandle { tx }, rx)
    }

    /// Run the delivery loop.
    ///
    /// Exits when every [`NotifyHandle`] has been dropped.
    pub async fn run(
        pool: DbPool,
        client: WebhookClient,
        mut receiver: mpsc::UnboundedReceiver<JobId>,
    ) {
        while let Some(job_id) = receiver.recv().await {
            if let Err(e) = Self::process(&pool, &client, &job_id).await {
                tracing::error!(
                    job_id = %job_id,
                    error = %e,
                    "Failed to process delivery notification"
                );
            }
        }
        tracing::info!("Notification channel closed, delivery service shutting down");
    }

    /// Deliver one job's webhook and record the outcome.
    ///
    /// Jobs without a callback URL are skipped. The outcome write applies
    /// at most once per job; a duplicate handoff is logged and dropped.
    async fn process(pool: &DbPool, client: &WebhookClient, job_id: &str) -> Result<(), sqlx::Error> {
        let Some(job) = JobRepo::find_by_id(pool, job_id).await? else {
            tracing::warn!(job_id, "Job vanished before notification, skipping");
            return Ok(());
        };
        let Some(url) = job.callback_url.clone() else {
            return Ok(());
        };

        let outcome = client.deliver(&url, &job).await;
        tracing::info!(
            job_id,
            status = outcome.status,
            detail = outcome.detail.as_deref().unwrap_or(""),
            "Webhook delivery finished"
        );

        let wrote =
            JobRepo::record_webhook_result(pool, job_id, i32::from(outcome.status), outcome.sent_at)
                .await?;
        if !wrote {
            tracing::debug!(job_id, "Delivery outcome already recorded, skipping write");
        }
        Ok(())
    }
}
