use async_trait::async_trait;
use sqlx::PgPool;

use herald_common::error::AppError;
use herald_common::types::{DeliveryStatus, NewNotification, NotificationRecord};

use super::{NotificationLedger, PendingEntry};

/// PostgreSQL-backed ledger over the `notifications` table.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationLedger for PgLedger {
    async fn create_pending(&self, new: &NewNotification) -> Result<PendingEntry, AppError> {
        let inserted: Option<NotificationRecord> = sqlx::query_as(
            r#"
            INSERT INTO notifications (event_key, channel, recipient, content, status, attempts)
            VALUES ($1, $2, $3, $4, $5, 0)
            ON CONFLICT (event_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&new.event_key)
        .bind(&new.channel)
        .bind(&new.recipient)
        .bind(&new.content)
        .bind(DeliveryStatus::Pending.to_string())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = inserted {
            tracing::info!(
                event_key = %record.event_key,
                channel = %record.channel,
                "Notification recorded as pending"
            );
            return Ok(PendingEntry {
                record,
                created: true,
            });
        }

        let record = self
            .find_by_event_key(&new.event_key)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Notification {} conflicted on insert but could not be read back",
                    new.event_key
                ))
            })?;

        Ok(PendingEntry {
            record,
            created: false,
        })
    }

    async fn find_by_event_key(
        &self,
        event_key: &str,
    ) -> Result<Option<NotificationRecord>, AppError> {
        let record = sqlx::query_as("SELECT * FROM notifications WHERE event_key = $1")
            .bind(event_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn update_status(
        &self,
        event_key: &str,
        status: DeliveryStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET status = $2, updated_at = NOW() WHERE event_key = $1",
        )
        .bind(event_key)
        .bind(status.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_attempts_and_set_status(
        &self,
        event_key: &str,
        expected_attempts: i32,
        status: DeliveryStatus,
    ) -> Result<Option<NotificationRecord>, AppError> {
        // Single-statement compare-and-increment: the row lock serialises this
        // with a concurrent external update, and a second writer holding the
        // same count matches no row.
        let record = sqlx::query_as(
            r#"
            UPDATE notifications
            SET attempts = attempts + 1,
                status = CASE WHEN status = 'pending' THEN $2 ELSE status END,
                updated_at = NOW()
            WHERE event_key = $1 AND attempts = $3
            RETURNING *
            "#,
        )
        .bind(event_key)
        .bind(status.to_string())
        .bind(expected_attempts)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
