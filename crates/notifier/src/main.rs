use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use herald_common::config::AppConfig;
use herald_common::db;
use herald_common::error::AppError;
use herald_common::redis_pool::create_redis_pool;
use herald_notifier::channels::ChannelRouter;
use herald_notifier::ledger::PgLedger;
use herald_notifier::metrics::DeliveryMetrics;
use herald_notifier::queue::RedisQueue;
use herald_notifier::retry::RetryController;
use herald_notifier::worker::{DeliveryWorker, WorkerPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_notifier=info".into()),
        )
        .json()
        .init();

    tracing::info!("Herald notifier starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let redis = create_redis_pool(&config.redis_url).await?;
    let queue = Arc::new(RedisQueue::new(
        redis,
        &config.queue_key_prefix,
        Duration::from_millis(config.queue_poll_interval_ms),
        Duration::from_secs(config.queue_visibility_timeout_secs),
    ));

    let http = reqwest::Client::builder()
        .user_agent(concat!("herald-notifier/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let router = Arc::new(ChannelRouter::from_config(&config, http));
    let metrics = Arc::new(DeliveryMetrics::new()?);

    let worker = DeliveryWorker::new(
        Arc::new(PgLedger::new(pool)),
        queue,
        router,
        RetryController::from_config(&config),
        metrics.clone(),
    )
    .with_send_timeout(Duration::from_secs(config.send_timeout_secs));

    let workers = WorkerPool::spawn(worker, config.worker_concurrency);

    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(health_check))
        .with_state(metrics);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on {}", addr);

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Metrics server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, draining workers...");
        }
    }

    workers.shutdown().await;
    tracing::info!("Herald notifier stopped.");
    Ok(())
}

async fn render_metrics(State(metrics): State<Arc<DeliveryMetrics>>) -> Result<String, AppError> {
    metrics.encode()
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "herald-notifier",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
