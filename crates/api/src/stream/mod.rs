//! Streaming gateway infrastructure: event envelopes and the per-principal
//! connection limiter. The polling loop itself lives in
//! [`crate::handlers::stream`].

pub mod event;
pub mod limiter;
