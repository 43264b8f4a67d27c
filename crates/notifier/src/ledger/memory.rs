//! In-process ledger for tests and local runs without PostgreSQL.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use herald_common::error::AppError;
use herald_common::types::{DeliveryStatus, NewNotification, NotificationRecord};

use super::{NotificationLedger, PendingEntry};

#[derive(Default)]
struct LedgerState {
    records: HashMap<String, NotificationRecord>,
    next_id: i64,
}

/// Ledger held in a mutex-guarded map. Every operation runs under the lock,
/// which gives the same per-key atomicity as the SQL implementation.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl NotificationLedger for InMemoryLedger {
    async fn create_pending(&self, new: &NewNotification) -> Result<PendingEntry, AppError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.records.get(&new.event_key) {
            return Ok(PendingEntry {
                record: existing.clone(),
                created: false,
            });
        }

        state.next_id += 1;
        let now = Utc::now();
        let record = NotificationRecord {
            id: state.next_id,
            event_key: new.event_key.clone(),
            channel: new.channel.clone(),
            recipient: new.recipient.clone(),
            content: new.content.clone(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            created_at: now,
            updated_at: now,
        };
        state.records.insert(new.event_key.clone(), record.clone());

        Ok(PendingEntry {
            record,
            created: true,
        })
    }

    async fn find_by_event_key(
        &self,
        event_key: &str,
    ) -> Result<Option<NotificationRecord>, AppError> {
        Ok(self.state.lock().await.records.get(event_key).cloned())
    }

    async fn update_status(
        &self,
        event_key: &str,
        status: DeliveryStatus,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        match state.records.get_mut(event_key) {
            Some(record) => {
                record.status = status;
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_attempts_and_set_status(
        &self,
        event_key: &str,
        expected_attempts: i32,
        status: DeliveryStatus,
    ) -> Result<Option<NotificationRecord>, AppError> {
        let mut state = self.state.lock().await;
        let Some(record) = state
            .records
            .get_mut(event_key)
            .filter(|record| record.attempts == expected_attempts)
        else {
            return Ok(None);
        };

        record.attempts += 1;
        if record.status == DeliveryStatus::Pending {
            record.status = status;
        }
        record.updated_at = Utc::now();

        Ok(Some(record.clone()))
    }
}
