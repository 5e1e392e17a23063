//! Webhook delivery with bounded retry.
//!
//! [`WebhookClient`] POSTs a JSON job snapshot to the caller-supplied URL.
//! Only transport-level failures (connect, DNS, timeout) are retried, up to
//! three attempts with 1 s and 2 s pauses in between. Any received HTTP
//! response, success or error status alike, counts as delivered and ends
//! the attempt loop; receivers wanting redelivery must not respond at all.

use std::time::Duration;

use chrono::Utc;
use quarry_core::types::Timestamp;
use quarry_db::models::job::{Job, JobView};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

/// Total delivery attempts per job.
const MAX_ATTEMPTS: usize = 3;

/// Pause before the second and third attempts (2^attempt seconds).
const RETRY_DELAYS_SECS: [u64; 2] = [1, 2];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `User-Agent` sent with every delivery.
const USER_AGENT: &str = concat!("quarry/", env!("CARGO_PKG_VERSION"));

/// Response status recorded when every attempt failed in transport.
pub const STATUS_EXHAUSTED: u16 = 0;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal result of a delivery: either the first HTTP status received,
/// or [`STATUS_EXHAUSTED`] with a textual reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// HTTP status of the received response, or 0 when exhausted.
    pub status: u16,
    /// Failure reason when exhausted (`timeout` or `connection_error: ..`).
    pub detail: Option<String>,
    /// When the outcome was determined.
    pub sent_at: Timestamp,
}

/// Webhook payload: the owner-facing job snapshot plus the delivery time.
#[derive(Debug, Serialize)]
struct WebhookPayload {
    #[serde(flatten)]
    job: JobView,
    webhook_sent_at: Timestamp,
}

// ---------------------------------------------------------------------------
// WebhookClient
// ---------------------------------------------------------------------------

/// Delivers terminal-job notifications to external webhook endpoints.
#[derive(Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    /// Create a new client with a pre-configured request timeout.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client }
    }

    /// Deliver the job snapshot to `url`.
    ///
    /// Never fails: the outcome carries either the received HTTP status or
    /// [`STATUS_EXHAUSTED`] once all attempts hit transport errors.
    pub async fn deliver(&self, url: &str, job: &Job) -> DeliveryOutcome {
        let payload = WebhookPayload {
            job: JobView::from(job.clone()),
            webhook_sent_at: Utc::now(),
        };
        let headers = build_headers(job);

        let mut last_reason = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_send(url, &headers, &payload).await {
                Ok(status) => {
                    return DeliveryOutcome {
                        status,
                        detail: None,
                        sent_at: Utc::now(),
                    };
                }
                Err(e) => {
                    last_reason = classify_transport_error(&e);
                    tracing::warn!(
                        attempt,
                        url,
                        error = %e,
                        "Webhook delivery attempt failed in transport"
                    );
                    if attempt < MAX_ATTEMPTS {
                        let delay = RETRY_DELAYS_SECS[attempt - 1];
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    }
                }
            }
        }

        tracing::error!(url, reason = %last_reason, "Webhook delivery exhausted all attempts");
        DeliveryOutcome {
            status: STATUS_EXHAUSTED,
            detail: Some(last_reason),
            sent_at: Utc::now(),
        }
    }

    /// Execute a single POST and return the response status, whatever it is.
    async fn try_send(
        &self,
        url: &str,
        headers: &HeaderMap,
        payload: &WebhookPayload,
    ) -> Result<u16, reqwest::Error> {
        let response = self
            .client
            .post(url)
            .headers(headers.clone())
            .json(payload)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Assemble delivery headers: `X-Job-ID` and `User-Agent` first, then the
/// caller's `callback_headers` merged on top (caller wins on collision).
/// Entries that are not valid HTTP headers are skipped, never fatal.
fn build_headers(job: &Job) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&job.id) {
        headers.insert("x-job-id", value);
    }
    headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));

    if let Some(custom) = job.callback_headers.as_ref().and_then(|v| v.as_object()) {
        for (name, value) in custom {
            let Some(value) = value.as_str() else { continue };
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => {
                    tracing::warn!(job_id = %job.id, header = %name, "Skipping invalid callback header");
                }
            }
        }
    }
    headers
}

/// Reduce a transport error to the recorded reason string.
fn classify_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timeout".to_string()
    } else {
        format!("connection_error: {e}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
