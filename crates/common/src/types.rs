use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Notification delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Push];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel labels are matched case-insensitively ("Email", "SMS", "push").
impl FromStr for Channel {
    type Err = AppError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "push" => Ok(Channel::Push),
            _ => Err(AppError::UnsupportedChannel(label.to_string())),
        }
    }
}

/// Notification delivery status.
///
/// `Sent` and `Failed` are terminal for the delivery worker; only an external
/// status update may move a record out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(AppError::Validation(format!(
                "Invalid status '{}'. Valid statuses: pending, sent, failed",
                other
            ))),
        }
    }
}

/// A notification's ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    /// Producer-assigned natural key; all lookups and updates go through it.
    pub event_key: String,
    /// Channel label as submitted. Parsed into a [`Channel`] when the delivery item is built.
    pub channel: String,
    pub recipient: String,
    pub content: String,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the producer when a notification is submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    #[serde(alias = "event_type")]
    pub event_key: String,
    pub channel: String,
    pub recipient: String,
    pub content: String,
}

impl NewNotification {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.event_key.trim().is_empty() {
            return Err(AppError::Validation("event_key must not be empty".to_string()));
        }
        if self.recipient.trim().is_empty() {
            return Err(AppError::Validation("recipient must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Typed work item carried by the delivery queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryItem {
    pub event_key: String,
    pub channel: Channel,
    pub recipient: String,
    pub content: String,
}

impl DeliveryItem {
    /// Build the queue payload for a ledger record, validating its channel label.
    pub fn from_record(record: &NotificationRecord) -> Result<Self, AppError> {
        Ok(Self {
            event_key: record.event_key.clone(),
            channel: record.channel.parse()?,
            recipient: record.recipient.clone(),
            content: record.content.clone(),
        })
    }
}
