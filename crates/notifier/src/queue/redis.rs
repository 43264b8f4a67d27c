//! Redis-backed delivery queue.
//!
//! Two sorted sets hold the queue:
//! - `{prefix}:ready`: members scored by the unix-millis instant they become visible
//! - `{prefix}:processing`: leased members scored by their visibility deadline
//!
//! A Lua script claims the earliest ready member and moves it to the
//! processing set in one step, after first returning any expired leases to the
//! ready set. Members are JSON envelopes carrying a unique id so identical
//! payloads never collapse into one member.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::Script;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::DeliveryItem;

use super::{Lease, TaskQueue};

const CLAIM_SCRIPT: &str = r#"
local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, member in ipairs(expired) do
    redis.call('ZREM', KEYS[2], member)
    redis.call('ZADD', KEYS[1], ARGV[1], member)
end
local ready = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #ready == 0 then
    return false
end
redis.call('ZREM', KEYS[1], ready[1])
redis.call('ZADD', KEYS[2], ARGV[2], ready[1])
return ready[1]
"#;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    id: Uuid,
    item: DeliveryItem,
}

pub struct RedisQueue {
    redis: ConnectionManager,
    ready_key: String,
    processing_key: String,
    poll_interval: Duration,
    visibility_timeout: Duration,
    claim: Script,
}

impl RedisQueue {
    pub fn new(
        redis: ConnectionManager,
        key_prefix: &str,
        poll_interval: Duration,
        visibility_timeout: Duration,
    ) -> Self {
        Self {
            redis,
            ready_key: format!("{}:ready", key_prefix),
            processing_key: format!("{}:processing", key_prefix),
            poll_interval,
            visibility_timeout,
            claim: Script::new(CLAIM_SCRIPT),
        }
    }

    /// Try to lease one ready member without waiting.
    async fn try_claim(&self) -> Result<Option<String>, AppError> {
        let mut conn = self.redis.clone();
        let now = Utc::now().timestamp_millis();
        let deadline = now + millis(self.visibility_timeout);

        let member: Option<String> = self
            .claim
            .key(&self.ready_key)
            .key(&self.processing_key)
            .arg(now)
            .arg(deadline)
            .invoke_async(&mut conn)
            .await?;

        Ok(member)
    }

    /// Number of members waiting in the ready set.
    pub async fn ready_len(&self) -> Result<u64, AppError> {
        let mut conn = self.redis.clone();
        let len: u64 = redis::cmd("ZCARD")
            .arg(&self.ready_key)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    /// Number of leased members not yet acknowledged.
    pub async fn processing_len(&self) -> Result<u64, AppError> {
        let mut conn = self.redis.clone();
        let len: u64 = redis::cmd("ZCARD")
            .arg(&self.processing_key)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn enqueue(&self, item: &DeliveryItem, delay: Duration) -> Result<(), AppError> {
        let member = serde_json::to_string(&Envelope {
            id: Uuid::new_v4(),
            item: item.clone(),
        })?;
        let score = Utc::now().timestamp_millis().saturating_add(millis(delay));

        let mut conn = self.redis.clone();
        let _: () = redis::cmd("ZADD")
            .arg(&self.ready_key)
            .arg(score)
            .arg(&member)
            .query_async(&mut conn)
            .await?;

        tracing::debug!(
            event_key = %item.event_key,
            delay_ms = millis(delay),
            "Delivery item enqueued"
        );
        Ok(())
    }

    async fn dequeue(&self) -> Result<Lease, AppError> {
        loop {
            let Some(member) = self.try_claim().await? else {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };

            match serde_json::from_str::<Envelope>(&member) {
                Ok(envelope) => return Ok(Lease::new(envelope.item, member)),
                Err(e) => {
                    // Unparseable payloads can never be delivered; drop them
                    tracing::error!(error = %e, payload = %member, "Discarding malformed delivery item");
                    let mut conn = self.redis.clone();
                    let _: () = redis::cmd("ZREM")
                        .arg(&self.processing_key)
                        .arg(&member)
                        .query_async(&mut conn)
                        .await?;
                }
            }
        }
    }

    async fn ack(&self, lease: &Lease) -> Result<(), AppError> {
        let mut conn = self.redis.clone();
        let _: () = redis::cmd("ZREM")
            .arg(&self.processing_key)
            .arg(lease.token())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self, lease: &Lease, delay: Duration) -> Result<(), AppError> {
        let score = Utc::now().timestamp_millis().saturating_add(millis(delay));

        let mut conn = self.redis.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZREM")
            .arg(&self.processing_key)
            .arg(lease.token())
            .ignore()
            .cmd("ZADD")
            .arg(&self.ready_key)
            .arg(score)
            .arg(lease.token())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
