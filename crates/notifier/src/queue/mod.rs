//! Delivery work queue.
//!
//! The queue is at-least-once: [`TaskQueue::dequeue`] hands out a [`Lease`]
//! that the worker acknowledges once the attempt's outcome is persisted. A
//! lease that is never acknowledged (crashed worker) becomes visible again.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::types::DeliveryItem;

pub use self::memory::InMemoryQueue;
pub use self::redis::RedisQueue;

/// A dequeued item together with the backend's handle for acknowledging it.
#[derive(Debug, Clone)]
pub struct Lease {
    pub item: DeliveryItem,
    pub(crate) token: String,
}

impl Lease {
    pub fn new(item: DeliveryItem, token: impl Into<String>) -> Self {
        Self {
            item,
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Schedule `item` to become visible after `delay`.
    async fn enqueue(&self, item: &DeliveryItem, delay: Duration) -> Result<(), AppError>;

    /// Wait until an item is ready and lease it.
    async fn dequeue(&self) -> Result<Lease, AppError>;

    /// Drop a leased item for good.
    async fn ack(&self, lease: &Lease) -> Result<(), AppError>;

    /// Return a leased item to the queue, visible again after `delay`.
    async fn release(&self, lease: &Lease, delay: Duration) -> Result<(), AppError>;
}
