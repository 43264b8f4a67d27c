//! Notification routes: trigger delivery, read the ledger, accept provider callbacks.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use herald_common::error::AppError;
use herald_common::types::{DeliveryStatus, NewNotification, NotificationRecord};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/notifications/trigger", post(trigger_notification))
        .route("/api/v1/notifications/reports/{event_key}", get(get_report))
        .route("/api/v1/notifications/webhook", post(handle_webhook))
}

/// Response for an accepted notification.
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub message: String,
    pub event_key: String,
    pub status: DeliveryStatus,
}

/// Delivery confirmation pushed by a provider.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub event_id: String,
    pub status: String,
}

/// POST /api/v1/notifications/trigger: Record a notification and queue its delivery.
async fn trigger_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(notification): Json<NewNotification>,
) -> Result<(StatusCode, Json<TriggerResponse>), AppError> {
    tracing::info!(
        event_key = %notification.event_key,
        channel = %notification.channel,
        producer = %auth.subject,
        "Triggering notification"
    );

    let record = state.notifications.submit(&notification).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            message: "Notification queued".to_string(),
            event_key: record.event_key,
            status: record.status,
        }),
    ))
}

/// GET /api/v1/notifications/reports/:event_key: Current delivery state.
async fn get_report(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(event_key): Path<String>,
) -> Result<Json<NotificationRecord>, AppError> {
    let record = state.notifications.report(&event_key).await?;
    Ok(Json(record))
}

/// POST /api/v1/notifications/webhook: Apply a provider's delivery confirmation.
///
/// Public: providers call it directly. The status overrides whatever the
/// worker recorded.
async fn handle_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<serde_json::Value>, AppError> {
    tracing::info!(
        event_key = %payload.event_id,
        status = %payload.status,
        "Webhook received"
    );

    let status: DeliveryStatus = payload.status.parse()?;
    state
        .notifications
        .apply_external_status(&payload.event_id, status)
        .await?;

    Ok(Json(serde_json::json!({ "message": "Status updated" })))
}
