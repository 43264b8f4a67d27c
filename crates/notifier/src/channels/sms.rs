//! SMS delivery through the Twilio Messages API.

use async_trait::async_trait;

use super::{ChannelSender, SendError};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

pub struct TwilioSmsSender {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from: String,
    api_base: String,
}

impl TwilioSmsSender {
    pub fn new(client: reqwest::Client, account_sid: &str, auth_token: &str, from: &str) -> Self {
        Self {
            client,
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from: from.to_string(),
            api_base: TWILIO_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            self.account_sid
        )
    }
}

#[async_trait]
impl ChannelSender for TwilioSmsSender {
    async fn send(&self, recipient: &str, content: &str) -> Result<bool, SendError> {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", recipient), ("From", self.from.as_str()), ("Body", content)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(recipient, status = status.as_u16(), body = %body, "SMS rejected by provider");
            return Ok(false);
        }

        let payload: serde_json::Value = response.json().await?;
        let sid = payload
            .get("sid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SendError::Provider("Twilio response is missing a message SID".to_string()))?;

        tracing::info!(recipient, sid, "SMS sent");
        Ok(true)
    }
}
