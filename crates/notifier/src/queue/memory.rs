//! In-process delayed queue for tests and single-process deployments.
//!
//! Items wait in a min-heap ordered by their ready instant. Leases are not
//! tracked: an item handed out is gone unless the worker releases it.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use herald_common::error::AppError;
use herald_common::types::DeliveryItem;

use super::{Lease, TaskQueue};

struct Scheduled {
    ready_at: Instant,
    seq: u64,
    item: DeliveryItem,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // FIFO among items that become ready at the same instant
        (self.ready_at, self.seq).cmp(&(other.ready_at, other.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Reverse<Scheduled>>,
    seq: u64,
}

#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scheduled items, ready or not.
    pub async fn len(&self) -> usize {
        self.state.lock().await.heap.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn enqueue(&self, item: &DeliveryItem, delay: Duration) -> Result<(), AppError> {
        {
            let mut state = self.state.lock().await;
            state.seq += 1;
            let seq = state.seq;
            state.heap.push(Reverse(Scheduled {
                ready_at: Instant::now() + delay,
                seq,
                item: item.clone(),
            }));
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Result<Lease, AppError> {
        loop {
            let next_ready = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                if state
                    .heap
                    .peek()
                    .is_some_and(|Reverse(next)| next.ready_at <= now)
                    && let Some(Reverse(next)) = state.heap.pop()
                {
                    let token = next.seq.to_string();
                    return Ok(Lease::new(next.item, token));
                }
                state.heap.peek().map(|Reverse(next)| next.ready_at)
            };

            match next_ready {
                Some(deadline) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    async fn ack(&self, _lease: &Lease) -> Result<(), AppError> {
        Ok(())
    }

    async fn release(&self, lease: &Lease, delay: Duration) -> Result<(), AppError> {
        self.enqueue(&lease.item, delay).await
    }
}
