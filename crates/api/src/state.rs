//! Shared application state for the Axum API server.

use std::sync::Arc;

use herald_common::config::AppConfig;
use herald_notifier::service::NotificationService;

use crate::middleware::metrics::HttpMetrics;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub notifications: NotificationService,
    pub metrics: Arc<HttpMetrics>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        notifications: NotificationService,
        metrics: Arc<HttpMetrics>,
        config: AppConfig,
    ) -> Self {
        Self {
            notifications,
            metrics,
            config,
        }
    }
}
