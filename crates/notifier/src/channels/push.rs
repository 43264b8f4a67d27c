//! Push delivery through Firebase Cloud Messaging.
//!
//! The recipient is the device registration token.

use async_trait::async_trait;
use serde_json::json;

use super::{ChannelSender, SendError};

const FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

const TITLE: &str = "Notification";

pub struct FcmPushSender {
    client: reqwest::Client,
    server_key: String,
    endpoint: String,
}

impl FcmPushSender {
    pub fn new(client: reqwest::Client, server_key: &str) -> Self {
        Self {
            client,
            server_key: server_key.to_string(),
            endpoint: FCM_ENDPOINT.to_string(),
        }
    }

    /// Point the sender at a different endpoint, e.g. a local stub.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ChannelSender for FcmPushSender {
    async fn send(&self, recipient: &str, content: &str) -> Result<bool, SendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&json!({
                "to": recipient,
                "notification": {
                    "title": TITLE,
                    "body": content,
                },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(device_id = recipient, status = status.as_u16(), "Push rejected by provider");
            return Ok(false);
        }

        // FCM answers 200 even when the token is invalid; per-message failures
        // are reported in the body.
        let payload: serde_json::Value = response.json().await?;
        let failures = payload
            .get("failure")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if failures > 0 {
            tracing::warn!(device_id = recipient, response = %payload, "Push rejected for device");
            return Ok(false);
        }

        tracing::info!(device_id = recipient, "Push sent");
        Ok(true)
    }
}
