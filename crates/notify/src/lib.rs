//! Delivery notification: outbound webhooks for terminal jobs.
//!
//! [`webhook::WebhookClient`] performs the HTTP delivery with bounded
//! retries; [`service::NotificationService`] is the background loop that
//! receives job ids after their terminal transition commits, delivers the
//! callback, and records the outcome on the job record exactly once.

pub mod service;
pub mod webhook;

pub use service::{NotificationService, NotifyHandle};
pub use webhook::{DeliveryOutcome, WebhookClient};
