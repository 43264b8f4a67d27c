//! Health check and metrics endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use herald_common::error::AppError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "herald-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn render_metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state.metrics.encode()
}
