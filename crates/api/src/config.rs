use std::time::Duration;

use quarry_dispatch::DispatcherConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Does not apply to
    /// the streaming endpoint, which carries its own duration limit.
    pub request_timeout_secs: u64,
    /// Maximum jobs executing at once (default: `4`).
    pub max_concurrent_jobs: usize,
    /// Per-job execution timeout in seconds (default: `3600`).
    pub job_timeout_secs: u64,
    /// Dispatcher claim-sweep interval in milliseconds (default: `500`).
    pub poll_interval_ms: u64,
    /// Hard wall for one SSE stream in seconds (default: `3600`).
    pub stream_max_duration_secs: u64,
    /// Pause between stream poll iterations in milliseconds (default: `500`).
    pub stream_poll_interval_ms: u64,
    /// Concurrent streams allowed per principal (default: `3`).
    pub max_streams_per_principal: usize,
    /// Progress snapshot time-to-live in seconds (default: `3600`).
    pub progress_ttl_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                    |
    /// |----------------------------|----------------------------|
    /// | `HOST`                     | `0.0.0.0`                  |
    /// | `PORT`                     | `3000`                     |
    /// | `CORS_ORIGINS`             | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                       |
    /// | `MAX_CONCURRENT_JOBS`      | `4`                        |
    /// | `JOB_TIMEOUT_SECS`         | `3600`                     |
    /// | `POLL_INTERVAL_MS`         | `500`                      |
    /// | `STREAM_MAX_DURATION_SECS` | `3600`                     |
    /// | `STREAM_POLL_INTERVAL_MS`  | `500`                      |
    /// | `MAX_STREAMS_PER_PRINCIPAL`| `3`                        |
    /// | `PROGRESS_TTL_SECS`        | `3600`                     |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_u64("REQUEST_TIMEOUT_SECS", 30),
            max_concurrent_jobs: env_u64("MAX_CONCURRENT_JOBS", 4) as usize,
            job_timeout_secs: env_u64("JOB_TIMEOUT_SECS", 3600),
            poll_interval_ms: env_u64("POLL_INTERVAL_MS", 500),
            stream_max_duration_secs: env_u64("STREAM_MAX_DURATION_SECS", 3600),
            stream_poll_interval_ms: env_u64("STREAM_POLL_INTERVAL_MS", 500),
            max_streams_per_principal: env_u64("MAX_STREAMS_PER_PRINCIPAL", 3) as usize,
            progress_ttl_secs: env_u64("PROGRESS_TTL_SECS", 3600),
        }
    }

    /// Dispatcher tunables derived from this configuration.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_concurrent: self.max_concurrent_jobs,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            job_timeout: Duration::from_secs(self.job_timeout_secs),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a valid u64"))
}
