//! Email delivery through the Resend HTTP API.

use async_trait::async_trait;
use serde_json::json;

use super::{ChannelSender, SendError};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Subject line used for every notification email.
const SUBJECT: &str = "Notification";

pub struct ResendEmailSender {
    client: reqwest::Client,
    api_key: String,
    from: String,
    endpoint: String,
}

impl ResendEmailSender {
    pub fn new(client: reqwest::Client, api_key: &str, from: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            from: from.to_string(),
            endpoint: RESEND_ENDPOINT.to_string(),
        }
    }

    /// Point the sender at a different API base, e.g. a local stub.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ChannelSender for ResendEmailSender {
    async fn send(&self, recipient: &str, content: &str) -> Result<bool, SendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [recipient],
                "subject": SUBJECT,
                "html": content,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(recipient, status = status.as_u16(), "Email sent");
            Ok(true)
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(recipient, status = status.as_u16(), body = %body, "Email rejected by provider");
            Ok(false)
        }
    }
}
