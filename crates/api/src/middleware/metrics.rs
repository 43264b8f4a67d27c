//! Prometheus request counters for the API, served on `/metrics`.

use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use herald_common::error::AppError;

pub struct HttpMetrics {
    registry: Registry,
    requests: IntCounterVec,
}

impl HttpMetrics {
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("herald_http_requests_total", "Total HTTP requests handled"),
            &["method", "route", "status"],
        )
        .map_err(|e| AppError::Internal(format!("Invalid request metric: {}", e)))?;
        registry
            .register(Box::new(requests.clone()))
            .map_err(|e| AppError::Internal(format!("Failed to register request metric: {}", e)))?;

        Ok(Self { registry, requests })
    }

    pub fn record(&self, method: &str, route: &str, status: u16) {
        self.requests
            .with_label_values(&[method, route, &status.to_string()])
            .inc();
    }

    pub fn request_count(&self, method: &str, route: &str, status: u16) -> u64 {
        self.requests
            .with_label_values(&[method, route, &status.to_string()])
            .get()
    }

    /// Render all counters in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AppError::Internal(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| AppError::Internal(format!("Metrics are not valid UTF-8: {}", e)))
    }
}

/// Count each routed request by method, route template and response status.
///
/// Must be installed with `route_layer` so the matched route is known; the
/// template keeps path parameters such as event keys out of the labels.
pub async fn track_requests(
    State(metrics): State<Arc<HttpMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics.record(&method, &route, response.status().as_u16());
    response
}
