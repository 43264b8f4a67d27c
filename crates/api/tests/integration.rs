//! Integration tests for API routes.
//!
//! Uses `tower::ServiceExt` to test Axum routes without a real HTTP server.
//! The notification service runs on the in-memory ledger and queue, so no
//! PostgreSQL or Redis instance is needed.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use herald_api::middleware::auth::encode_jwt;
use herald_api::middleware::metrics::HttpMetrics;
use herald_api::routes::create_router;
use herald_api::state::AppState;
use herald_common::config::AppConfig;
use herald_common::types::DeliveryStatus;
use herald_notifier::ledger::{InMemoryLedger, NotificationLedger};
use herald_notifier::queue::InMemoryQueue;
use herald_notifier::service::NotificationService;

// ============================================================
// Helpers
// ============================================================

/// Create a test AppConfig with a specific JWT secret.
fn test_config() -> AppConfig {
    AppConfig {
        database_url: "unused".to_string(),
        redis_url: "redis://localhost:6379".to_string(),
        db_max_connections: 5,
        jwt_secret: "test-jwt-secret-for-integration-tests".to_string(),
        jwt_expiry_hours: 24,
        api_port: 0,
        metrics_port: 0,
        worker_concurrency: 1,
        retry_max_attempts: 3,
        retry_base_delay_secs: 10,
        retry_backoff_multiplier: 2,
        retry_max_delay_secs: 600,
        send_timeout_secs: 30,
        queue_poll_interval_ms: 500,
        queue_visibility_timeout_secs: 300,
        queue_key_prefix: "herald:test".to_string(),
        resend_api_key: None,
        email_from: None,
        twilio_account_sid: None,
        twilio_auth_token: None,
        twilio_from_number: None,
        fcm_server_key: None,
    }
}

struct TestApp {
    state: AppState,
    ledger: Arc<InMemoryLedger>,
    queue: Arc<InMemoryQueue>,
    token: String,
}

fn build_test_app() -> TestApp {
    let config = test_config();
    let ledger = Arc::new(InMemoryLedger::new());
    let queue = Arc::new(InMemoryQueue::new());
    let service = NotificationService::new(ledger.clone(), queue.clone());
    let token = encode_jwt("billing-service", &config.jwt_secret, config.jwt_expiry_hours).unwrap();

    TestApp {
        state: AppState::new(service, Arc::new(HttpMetrics::new().unwrap()), config),
        ledger,
        queue,
        token,
    }
}

fn trigger_request(token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/notifications/trigger")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn webhook_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/notifications/webhook")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn email_notification(key: &str) -> serde_json::Value {
    serde_json::json!({
        "event_key": key,
        "channel": "email",
        "recipient": "user@example.com",
        "content": "Your invoice is ready"
    })
}

// ============================================================
// Health
// ============================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_app();

    let response = create_router(app.state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "herald-api");
}

#[tokio::test]
async fn test_metrics_count_routed_requests() {
    let app = build_test_app();

    create_router(app.state.clone())
        .oneshot(trigger_request(Some(&app.token), email_notification("counted")))
        .await
        .unwrap();
    create_router(app.state.clone())
        .oneshot(trigger_request(None, email_notification("counted")))
        .await
        .unwrap();
    create_router(app.state.clone())
        .oneshot(
            Request::builder()
                .uri("/api/v1/notifications/reports/counted")
                .header("authorization", format!("Bearer {}", app.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let metrics = &app.state.metrics;
    assert_eq!(metrics.request_count("POST", "/api/v1/notifications/trigger", 202), 1);
    assert_eq!(metrics.request_count("POST", "/api/v1/notifications/trigger", 401), 1);
    // Route templates, not concrete event keys, label the series
    assert_eq!(
        metrics.request_count("GET", "/api/v1/notifications/reports/{event_key}", 200),
        1
    );

    let response = create_router(app.state.clone())
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("herald_http_requests_total"));
    assert!(text.contains("status=\"202\""));
}

// ============================================================
// Trigger
// ============================================================

#[tokio::test]
async fn test_trigger_accepts_and_queues() {
    let app = build_test_app();

    let response = create_router(app.state.clone())
        .oneshot(trigger_request(Some(&app.token), email_notification("invoice-1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Notification queued");
    assert_eq!(json["event_key"], "invoice-1");
    assert_eq!(json["status"], "pending");

    assert_eq!(app.queue.len().await, 1);
    let record = app
        .ledger
        .find_by_event_key("invoice-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeliveryStatus::Pending);
    assert_eq!(record.attempts, 0);
}

#[tokio::test]
async fn test_trigger_accepts_event_type_alias() {
    let app = build_test_app();
    let body = serde_json::json!({
        "event_type": "welcome-42",
        "channel": "sms",
        "recipient": "+15550001111",
        "content": "Welcome aboard"
    });

    let response = create_router(app.state.clone())
        .oneshot(trigger_request(Some(&app.token), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(app.ledger.find_by_event_key("welcome-42").await.unwrap().is_some());
}

#[tokio::test]
async fn test_trigger_twice_queues_once() {
    let app = build_test_app();

    for _ in 0..2 {
        let response = create_router(app.state.clone())
            .oneshot(trigger_request(Some(&app.token), email_notification("dup-1")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    assert_eq!(app.ledger.len().await, 1);
    assert_eq!(app.queue.len().await, 1);
}

#[tokio::test]
async fn test_trigger_requires_auth() {
    let app = build_test_app();

    let response = create_router(app.state.clone())
        .oneshot(trigger_request(None, email_notification("no-auth")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.ledger.is_empty().await);
    assert!(app.queue.is_empty().await);
}

#[tokio::test]
async fn test_trigger_rejects_bad_token() {
    let app = build_test_app();
    let forged = encode_jwt("billing-service", "some-other-secret", 1).unwrap();

    let response = create_router(app.state.clone())
        .oneshot(trigger_request(Some(&forged), email_notification("forged")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_trigger_unsupported_channel() {
    let app = build_test_app();
    let body = serde_json::json!({
        "event_key": "pigeon-1",
        "channel": "pigeon",
        "recipient": "rooftop",
        "content": "coo"
    });

    let response = create_router(app.state.clone())
        .oneshot(trigger_request(Some(&app.token), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("pigeon"));

    // The row is kept as pending with nothing queued
    let record = app
        .ledger
        .find_by_event_key("pigeon-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeliveryStatus::Pending);
    assert_eq!(record.attempts, 0);
    assert!(app.queue.is_empty().await);
}

#[tokio::test]
async fn test_trigger_empty_recipient() {
    let app = build_test_app();
    let body = serde_json::json!({
        "event_key": "blank",
        "channel": "email",
        "recipient": "  ",
        "content": "hi"
    });

    let response = create_router(app.state.clone())
        .oneshot(trigger_request(Some(&app.token), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.ledger.is_empty().await);
}

// ============================================================
// Reports
// ============================================================

#[tokio::test]
async fn test_report_unknown_key() {
    let app = build_test_app();

    let response = create_router(app.state.clone())
        .oneshot(
            Request::builder()
                .uri("/api/v1/notifications/reports/missing")
                .header("authorization", format!("Bearer {}", app.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_report_returns_record() {
    let app = build_test_app();

    create_router(app.state.clone())
        .oneshot(trigger_request(Some(&app.token), email_notification("report-1")))
        .await
        .unwrap();

    let response = create_router(app.state.clone())
        .oneshot(
            Request::builder()
                .uri("/api/v1/notifications/reports/report-1")
                .header("authorization", format!("Bearer {}", app.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["event_key"], "report-1");
    assert_eq!(json["channel"], "email");
    assert_eq!(json["status"], "pending");
    assert_eq!(json["attempts"], 0);
}

// ============================================================
// Webhook
// ============================================================

#[tokio::test]
async fn test_webhook_overrides_status() {
    let app = build_test_app();

    create_router(app.state.clone())
        .oneshot(trigger_request(Some(&app.token), email_notification("hook-1")))
        .await
        .unwrap();

    let response = create_router(app.state.clone())
        .oneshot(webhook_request(
            serde_json::json!({"event_id": "hook-1", "status": "sent"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Status updated");

    let record = app
        .ledger
        .find_by_event_key("hook-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeliveryStatus::Sent);

    // Terminal statuses can be overridden again
    let response = create_router(app.state.clone())
        .oneshot(webhook_request(
            serde_json::json!({"event_id": "hook-1", "status": "failed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let record = app
        .ledger
        .find_by_event_key("hook-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeliveryStatus::Failed);
}

#[tokio::test]
async fn test_webhook_invalid_status() {
    let app = build_test_app();

    create_router(app.state.clone())
        .oneshot(trigger_request(Some(&app.token), email_notification("hook-2")))
        .await
        .unwrap();

    let response = create_router(app.state.clone())
        .oneshot(webhook_request(
            serde_json::json!({"event_id": "hook-2", "status": "delivered-ish"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let record = app
        .ledger
        .find_by_event_key("hook-2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DeliveryStatus::Pending);
}

#[tokio::test]
async fn test_webhook_unknown_key() {
    let app = build_test_app();

    let response = create_router(app.state.clone())
        .oneshot(webhook_request(
            serde_json::json!({"event_id": "ghost", "status": "sent"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.ledger.is_empty().await);
}
