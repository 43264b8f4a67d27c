//! Herald API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_common::db::{create_pool, run_migrations};
use herald_common::redis_pool::create_redis_pool;
use herald_notifier::ledger::PgLedger;
use herald_notifier::queue::RedisQueue;
use herald_notifier::service::NotificationService;

use herald_api::middleware::metrics::HttpMetrics;
use herald_api::routes::create_router;
use herald_api::state::AppState;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("herald_api=debug,herald_notifier=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Herald API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;

    // Create Redis connection for the delivery queue
    let redis = create_redis_pool(&config.redis_url).await?;
    let queue = RedisQueue::new(
        redis,
        &config.queue_key_prefix,
        Duration::from_millis(config.queue_poll_interval_ms),
        Duration::from_secs(config.queue_visibility_timeout_secs),
    );

    let notifications = NotificationService::new(Arc::new(PgLedger::new(pool)), Arc::new(queue));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));

    // Build application state
    let metrics = Arc::new(HttpMetrics::new()?);
    let state = AppState::new(notifications, metrics, config);

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
