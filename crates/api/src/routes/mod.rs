pub mod health;
pub mod notifications;

use axum::Router;
use axum::middleware::from_fn_with_state;

use crate::middleware::metrics::track_requests;
use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let metrics = state.metrics.clone();

    Router::new()
        .merge(health::router())
        .merge(notifications::router())
        .route_layer(from_fn_with_state(metrics, track_requests))
        .with_state(state)
}
