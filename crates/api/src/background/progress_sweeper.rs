//! Periodic purge of expired progress snapshots.
//!
//! The in-memory store drops expired entries lazily on read; jobs that
//! nobody streams would otherwise keep their snapshots resident until
//! process exit. Runs on a fixed interval using `tokio::time::interval`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use quarry_progress::ProgressStore;

/// How often the sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the progress sweeper loop until `cancel` is triggered.
pub async fn run(progress: ProgressStore, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "Progress sweeper started"
    );

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Progress sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                match progress.purge_expired().await {
                    Ok(purged) => {
                        if purged > 0 {
                            tracing::info!(purged, "Progress sweeper: purged expired snapshots");
                        } else {
                            tracing::debug!("Progress sweeper: nothing to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Progress sweeper: purge failed");
                    }
                }
            }
        }
    }
}
