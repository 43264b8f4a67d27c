//! Notification service: the surface producers and status callbacks use.
//!
//! `submit` records a notification as pending and schedules its first
//! delivery; `apply_external_status` lets a provider confirmation overwrite the
//! status outside the retry state machine.

use std::sync::Arc;
use std::time::Duration;

use herald_common::error::AppError;
use herald_common::types::{DeliveryItem, DeliveryStatus, NewNotification, NotificationRecord};

use crate::ledger::NotificationLedger;
use crate::queue::TaskQueue;

#[derive(Clone)]
pub struct NotificationService {
    ledger: Arc<dyn NotificationLedger>,
    queue: Arc<dyn TaskQueue>,
}

impl NotificationService {
    pub fn new(ledger: Arc<dyn NotificationLedger>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { ledger, queue }
    }

    /// Record a notification as pending and enqueue its first delivery.
    ///
    /// The ledger row is written before the channel label is validated, so an
    /// unsupported channel leaves a `pending` record with zero attempts and
    /// nothing on the queue. Resubmitting an existing `event_key` returns the
    /// existing record without enqueuing a second delivery.
    pub async fn submit(&self, new: &NewNotification) -> Result<NotificationRecord, AppError> {
        new.validate()?;

        let entry = self.ledger.create_pending(new).await?;
        let item = DeliveryItem::from_record(&entry.record)?;

        if !entry.created {
            tracing::info!(
                event_key = %new.event_key,
                status = %entry.record.status,
                "Duplicate submission, delivery already scheduled"
            );
            return Ok(entry.record);
        }

        self.queue.enqueue(&item, Duration::ZERO).await?;

        tracing::info!(
            event_key = %item.event_key,
            channel = %item.channel,
            "Notification queued"
        );
        Ok(entry.record)
    }

    /// Overwrite a notification's status unconditionally, terminal statuses included.
    pub async fn apply_external_status(
        &self,
        event_key: &str,
        status: DeliveryStatus,
    ) -> Result<(), AppError> {
        if !self.ledger.update_status(event_key, status).await? {
            return Err(AppError::NotFound(format!(
                "Notification {} not found",
                event_key
            )));
        }

        tracing::info!(event_key, status = %status, "External status applied");
        Ok(())
    }

    /// Current ledger state for a notification.
    pub async fn report(&self, event_key: &str) -> Result<NotificationRecord, AppError> {
        self.ledger
            .find_by_event_key(event_key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", event_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::queue::InMemoryQueue;

    fn setup() -> (NotificationService, Arc<InMemoryLedger>, Arc<InMemoryQueue>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let queue = Arc::new(InMemoryQueue::new());
        let service = NotificationService::new(ledger.clone(), queue.clone());
        (service, ledger, queue)
    }

    fn request(key: &str, channel: &str) -> NewNotification {
        NewNotification {
            event_key: key.to_string(),
            channel: channel.to_string(),
            recipient: "a@b.c".to_string(),
            content: "hi".to_string(),
        }
    }

    #[tokio::test]
    async fn test_submit_records_pending_and_enqueues() {
        let (service, _ledger, queue) = setup();

        let record = service.submit(&request("e1", "Email")).await.unwrap();

        assert_eq!(record.status, DeliveryStatus::Pending);
        assert_eq!(record.attempts, 0);
        let lease = queue.dequeue().await.unwrap();
        assert_eq!(lease.item.event_key, "e1");
        assert_eq!(lease.item.channel, herald_common::types::Channel::Email);
    }

    #[tokio::test]
    async fn test_duplicate_submit_enqueues_once() {
        let (service, ledger, queue) = setup();

        service.submit(&request("e1", "email")).await.unwrap();
        service.submit(&request("e1", "email")).await.unwrap();

        assert_eq!(ledger.len().await, 1);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_unsupported_channel_leaves_pending_record() {
        let (service, _ledger, queue) = setup();

        let err = service.submit(&request("e3", "fax")).await.unwrap_err();

        assert!(matches!(err, AppError::UnsupportedChannel(_)));
        let record = service.report("e3").await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Pending);
        assert_eq!(record.attempts, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_event_key_rejected() {
        let (service, ledger, _queue) = setup();

        let err = service.submit(&request("  ", "email")).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_external_status_is_idempotent() {
        let (service, _ledger, _queue) = setup();
        service.submit(&request("e1", "sms")).await.unwrap();

        service
            .apply_external_status("e1", DeliveryStatus::Sent)
            .await
            .unwrap();
        let once = service.report("e1").await.unwrap();
        service
            .apply_external_status("e1", DeliveryStatus::Sent)
            .await
            .unwrap();
        let twice = service.report("e1").await.unwrap();

        assert_eq!(once.status, twice.status);
        assert_eq!(once.attempts, twice.attempts);
        assert_eq!(twice.status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn test_external_status_overrides_terminal() {
        let (service, ledger, _queue) = setup();
        service.submit(&request("e1", "push")).await.unwrap();
        ledger
            .increment_attempts_and_set_status("e1", 0, DeliveryStatus::Failed)
            .await
            .unwrap();

        service
            .apply_external_status("e1", DeliveryStatus::Sent)
            .await
            .unwrap();

        assert_eq!(
            service.report("e1").await.unwrap().status,
            DeliveryStatus::Sent
        );
    }

    #[tokio::test]
    async fn test_external_status_unknown_key() {
        let (service, _ledger, _queue) = setup();
        let err = service
            .apply_external_status("missing", DeliveryStatus::Sent)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
