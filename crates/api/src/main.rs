use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quarry_api::config::ServerConfig;
use quarry_api::stream::limiter::StreamLimiter;
use quarry_api::{background, router, state};
use quarry_dispatch::builtin::{SleepHandler, DIAGNOSTICS_GROUP, SLEEP_NAME};
use quarry_dispatch::{HandlerRegistry, JobDispatcher};
use quarry_notify::{NotificationService, WebhookClient};
use quarry_progress::ProgressStore;

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quarry_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = quarry_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    quarry_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    quarry_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Progress store ---
    let ttl = Duration::from_secs(config.progress_ttl_secs);
    #[cfg(feature = "redis")]
    let progress = match std::env::var("REDIS_URL") {
        Ok(url) => {
            ProgressStore::redis(&url, ttl).expect("Failed to open Redis progress store")
        }
        Err(_) => ProgressStore::in_memory(ttl),
    };
    #[cfg(not(feature = "redis"))]
    let progress = ProgressStore::in_memory(ttl);

    // --- Handler registry ---
    let mut registry = HandlerRegistry::new();
    registry.register(DIAGNOSTICS_GROUP, SLEEP_NAME, SleepHandler);
    let registry = Arc::new(registry);
    tracing::info!(
        operations = registry.operations().len(),
        "Handler registry built"
    );

    // --- Notification service ---
    let (notifier, notify_rx) = NotificationService::channel();
    let notifier_handle = tokio::spawn(NotificationService::run(
        pool.clone(),
        WebhookClient::new(),
        notify_rx,
    ));

    // --- Dispatcher ---
    let cancel = CancellationToken::new();
    let dispatcher = JobDispatcher::new(
        pool.clone(),
        progress.clone(),
        Arc::clone(&registry),
        notifier.clone(),
        config.dispatcher_config(),
    );
    let dispatcher_cancel = cancel.clone();
    let dispatcher_handle = tokio::spawn(async move { dispatcher.run(dispatcher_cancel).await });

    // --- Progress sweeper ---
    let sweeper_handle = tokio::spawn(background::progress_sweeper::run(
        progress.clone(),
        cancel.clone(),
    ));

    tracing::info!("Background services started (notifier, dispatcher, progress sweeper)");

    // --- App state ---
    let stream_limiter = StreamLimiter::new(
        config.max_streams_per_principal,
        chrono::Duration::seconds(config.stream_max_duration_secs as i64),
    );
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        progress,
        registry,
        notifier: notifier.clone(),
        stream_limiter,
    };

    // --- Router ---
    let app = router::build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop claiming new jobs; in-flight handlers finish on their own tasks.
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;
    tracing::info!("Dispatcher and progress sweeper stopped");

    // Drop the last notify sender so the notification service drains and exits.
    drop(notifier);
    let _ = tokio::time::timeout(Duration::from_secs(5), notifier_handle).await;
    tracing::info!("Notification service stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
