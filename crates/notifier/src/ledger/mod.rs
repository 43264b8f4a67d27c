//! Notification ledger: the durable status/attempt record for each notification.
//!
//! All reads and writes are keyed by `event_key`. Two writers share the ledger:
//! the delivery worker (`increment_attempts_and_set_status`) and the external
//! status path (`update_status`). The worker's write never moves a terminal
//! status, while the external write always wins.
//!
//! The worker's write is a compare-and-increment on `attempts`. A redelivered
//! copy of an item that is still in flight reads the same count as the
//! original, so at most one of them gets to record the attempt.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::types::{DeliveryStatus, NewNotification, NotificationRecord};

pub use memory::InMemoryLedger;
pub use postgres::PgLedger;

/// Result of [`NotificationLedger::create_pending`].
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub record: NotificationRecord,
    /// `false` when a record with the same `event_key` already existed.
    pub created: bool,
}

#[async_trait]
pub trait NotificationLedger: Send + Sync {
    /// Insert a `pending` record with zero attempts. Idempotent on `event_key`:
    /// an existing record is returned untouched.
    async fn create_pending(&self, new: &NewNotification) -> Result<PendingEntry, AppError>;

    async fn find_by_event_key(&self, event_key: &str)
    -> Result<Option<NotificationRecord>, AppError>;

    /// Overwrite the status unconditionally, terminal statuses included.
    /// Returns `false` when no record matches.
    async fn update_status(&self, event_key: &str, status: DeliveryStatus)
    -> Result<bool, AppError>;

    /// Atomically add one attempt and set `status`, provided the record still
    /// holds `expected_attempts`. A record that already left `pending` keeps
    /// its status; only the attempt is counted.
    ///
    /// Returns `None` when no record matches the key and count.
    async fn increment_attempts_and_set_status(
        &self,
        event_key: &str,
        expected_attempts: i32,
        status: DeliveryStatus,
    ) -> Result<Option<NotificationRecord>, AppError>;
}
