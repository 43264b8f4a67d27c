//! Channel router: maps a [`Channel`] to the capability that sends through it.
//!
//! Every capability has the same contract, `send(recipient, content)`, which is
//! what keeps the delivery worker channel-agnostic. The router itself only
//! looks senders up; it never retries and never writes the ledger.

pub mod email;
pub mod push;
pub mod sms;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use herald_common::config::AppConfig;
use herald_common::error::AppError;
use herald_common::types::Channel;

pub use email::ResendEmailSender;
pub use push::FcmPushSender;
pub use sms::TwilioSmsSender;

/// Transport-level failure raised by a send capability.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider error: {0}")]
    Provider(String),
}

/// A channel's send capability.
///
/// `Ok(false)` means the provider answered but refused the message; `Err` means
/// the provider could not be reached. The worker treats both as a failed attempt.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, recipient: &str, content: &str) -> Result<bool, SendError>;
}

/// Capability table keyed by channel.
#[derive(Clone, Default)]
pub struct ChannelRouter {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the sender for `channel`.
    pub fn with_sender(mut self, channel: Channel, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(channel, sender);
        self
    }

    /// Build the router from provider credentials. Channels whose credentials
    /// are missing stay unregistered and resolve to `UnsupportedChannel`.
    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Self {
        let mut router = Self::new();

        if let (Some(api_key), Some(from)) = (&config.resend_api_key, &config.email_from) {
            router = router.with_sender(
                Channel::Email,
                Arc::new(ResendEmailSender::new(client.clone(), api_key, from)),
            );
        }

        if let (Some(sid), Some(token), Some(from)) = (
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_from_number,
        ) {
            router = router.with_sender(
                Channel::Sms,
                Arc::new(TwilioSmsSender::new(client.clone(), sid, token, from)),
            );
        }

        if let Some(server_key) = &config.fcm_server_key {
            router = router.with_sender(
                Channel::Push,
                Arc::new(FcmPushSender::new(client, server_key)),
            );
        }

        for channel in Channel::ALL {
            if !router.supports(channel) {
                tracing::warn!(
                    channel = %channel,
                    "No provider credentials configured; channel is unsupported"
                );
            }
        }

        router
    }

    pub fn supports(&self, channel: Channel) -> bool {
        self.senders.contains_key(&channel)
    }

    /// Look up the send capability for `channel`.
    pub fn resolve(&self, channel: Channel) -> Result<Arc<dyn ChannelSender>, AppError> {
        self.senders
            .get(&channel)
            .cloned()
            .ok_or_else(|| AppError::UnsupportedChannel(channel.to_string()))
    }
}

/// Local HTTP stand-in for provider APIs.
#[cfg(test)]
pub(crate) mod stub {
    use axum::Router;

    /// Serve `router` on an ephemeral local port and return its base URL.
    pub(crate) async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{}", addr)
    }

    /// A base URL nothing listens on.
    pub(crate) async fn closed_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOk;

    #[async_trait]
    impl ChannelSender for AlwaysOk {
        async fn send(&self, _recipient: &str, _content: &str) -> Result<bool, SendError> {
            Ok(true)
        }
    }

    fn config() -> AppConfig {
        AppConfig {
            database_url: "unused".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            db_max_connections: 5,
            jwt_secret: "secret".to_string(),
            jwt_expiry_hours: 24,
            api_port: 3000,
            metrics_port: 9100,
            worker_concurrency: 1,
            retry_max_attempts: 3,
            retry_base_delay_secs: 10,
            retry_backoff_multiplier: 2,
            retry_max_delay_secs: 600,
            send_timeout_secs: 30,
            queue_poll_interval_ms: 500,
            queue_visibility_timeout_secs: 300,
            queue_key_prefix: "herald:test".to_string(),
            resend_api_key: Some("re_test".to_string()),
            email_from: Some("noreply@example.com".to_string()),
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_from_number: None,
            fcm_server_key: Some("fcm-key".to_string()),
        }
    }

    #[tokio::test]
    async fn test_resolve_registered_channel() {
        let router = ChannelRouter::new().with_sender(Channel::Email, Arc::new(AlwaysOk));
        let sender = router.resolve(Channel::Email).unwrap();
        assert!(sender.send("a@b.c", "hi").await.unwrap());
    }

    #[test]
    fn test_unregistered_channel_is_unsupported() {
        let router = ChannelRouter::new().with_sender(Channel::Email, Arc::new(AlwaysOk));
        let err = router.resolve(Channel::Sms).err().unwrap();
        assert!(matches!(err, AppError::UnsupportedChannel(label) if label == "sms"));
    }

    #[test]
    fn test_from_config_registers_configured_providers_only() {
        let router = ChannelRouter::from_config(&config(), reqwest::Client::new());
        assert!(router.supports(Channel::Email));
        assert!(!router.supports(Channel::Sms));
        assert!(router.supports(Channel::Push));
    }
}
