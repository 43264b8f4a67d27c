//! Delivery worker: consumes the queue and drives each notification through
//! its attempts.
//!
//! Per item:
//! 1. Resolve the channel's send capability (`UnsupportedChannel` stops here, ledger untouched)
//! 2. Re-read the ledger; anything no longer `pending` is skipped
//! 3. Send under the per-attempt timeout
//! 4. Count the attempt and record the outcome in one ledger write, guarded by
//!    the attempt count read in step 2
//! 5. On a retryable failure, re-enqueue with the backoff delay
//!
//! A redelivered copy of an item still in flight loses the guarded write and
//! is dropped, so it never schedules a retry of its own.
//!
//! Ledger and queue errors are infrastructure failures: they propagate out of
//! [`DeliveryWorker::process`] without consuming an attempt, and the run loop
//! hands the lease back to the queue and backs off.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use herald_common::error::AppError;
use herald_common::types::{DeliveryItem, DeliveryStatus};

use crate::channels::{ChannelRouter, ChannelSender};
use crate::ledger::NotificationLedger;
use crate::metrics::DeliveryMetrics;
use crate::queue::{Lease, TaskQueue};
use crate::retry::{AttemptState, RetryController, RetryDecision};

/// Default per-attempt send timeout.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Backoff applied by the run loop after an infrastructure failure.
const INFRA_BACKOFF_MIN: Duration = Duration::from_secs(1);
const INFRA_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// What a single `process` call did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Provider accepted the notification; record is now `sent`.
    Sent { attempts: i32 },
    /// Attempt failed and the item was re-enqueued after `delay`.
    Retrying { attempts: i32, delay: Duration },
    /// Final attempt failed; record is now `failed`.
    Exhausted { attempts: i32 },
    /// Record had already left `pending`; nothing was sent or re-enqueued.
    Skipped { status: DeliveryStatus },
}

#[derive(Clone)]
pub struct DeliveryWorker {
    ledger: Arc<dyn NotificationLedger>,
    queue: Arc<dyn TaskQueue>,
    router: Arc<ChannelRouter>,
    retry: RetryController,
    metrics: Arc<DeliveryMetrics>,
    send_timeout: Duration,
}

impl DeliveryWorker {
    pub fn new(
        ledger: Arc<dyn NotificationLedger>,
        queue: Arc<dyn TaskQueue>,
        router: Arc<ChannelRouter>,
        retry: RetryController,
        metrics: Arc<DeliveryMetrics>,
    ) -> Self {
        Self {
            ledger,
            queue,
            router,
            retry,
            metrics,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Run one delivery attempt for `item`.
    pub async fn process(&self, item: &DeliveryItem) -> Result<DeliveryOutcome, AppError> {
        let sender = self.router.resolve(item.channel)?;

        let record = self
            .ledger
            .find_by_event_key(&item.event_key)
            .await?
            .ok_or_else(|| not_found(&item.event_key))?;

        if record.status.is_terminal() {
            tracing::debug!(
                event_key = %item.event_key,
                status = %record.status,
                "Notification already settled, skipping attempt"
            );
            return Ok(DeliveryOutcome::Skipped {
                status: record.status,
            });
        }

        tracing::debug!(
            event_key = %item.event_key,
            channel = %item.channel,
            attempt = record.attempts + 1,
            state = ?AttemptState::Attempting,
            "Attempting delivery"
        );

        if self.attempt(sender.as_ref(), item).await {
            let Some(updated) = self
                .ledger
                .increment_attempts_and_set_status(
                    &item.event_key,
                    record.attempts,
                    DeliveryStatus::Sent,
                )
                .await?
            else {
                return self.superseded(item).await;
            };

            if updated.status != DeliveryStatus::Sent {
                tracing::info!(
                    event_key = %item.event_key,
                    status = %updated.status,
                    "Notification settled externally during delivery"
                );
                return Ok(DeliveryOutcome::Skipped {
                    status: updated.status,
                });
            }

            self.metrics.record_sent(item.channel);
            tracing::info!(
                event_key = %item.event_key,
                channel = %item.channel,
                attempts = updated.attempts,
                state = ?self.retry.on_success(),
                "Notification sent"
            );
            return Ok(DeliveryOutcome::Sent {
                attempts: updated.attempts,
            });
        }

        // The write below only lands if `attempts` still holds the value read
        // above, so the decision made from it is the one the ledger records.
        let attempts = u32::try_from(record.attempts).unwrap_or(0) + 1;
        let decision = self.retry.on_failure(attempts);
        let status = match decision {
            RetryDecision::Retry { .. } => DeliveryStatus::Pending,
            RetryDecision::GiveUp => DeliveryStatus::Failed,
        };

        let Some(updated) = self
            .ledger
            .increment_attempts_and_set_status(&item.event_key, record.attempts, status)
            .await?
        else {
            return self.superseded(item).await;
        };

        if updated.status != status {
            tracing::info!(
                event_key = %item.event_key,
                status = %updated.status,
                "Notification settled externally, retry cancelled"
            );
            return Ok(DeliveryOutcome::Skipped {
                status: updated.status,
            });
        }

        match decision {
            RetryDecision::Retry { delay } => {
                self.queue.enqueue(item, delay).await?;
                self.metrics.record_retry(item.channel);
                tracing::warn!(
                    event_key = %item.event_key,
                    channel = %item.channel,
                    attempts = updated.attempts,
                    max_attempts = self.retry.max_attempts(),
                    delay_secs = delay.as_secs(),
                    state = ?decision.next_state(),
                    "Delivery failed, retry scheduled"
                );
                Ok(DeliveryOutcome::Retrying {
                    attempts: updated.attempts,
                    delay,
                })
            }
            RetryDecision::GiveUp => {
                self.metrics.record_failed(item.channel);
                tracing::error!(
                    event_key = %item.event_key,
                    channel = %item.channel,
                    attempts = updated.attempts,
                    state = ?decision.next_state(),
                    "Delivery failed, attempts exhausted"
                );
                Ok(DeliveryOutcome::Exhausted {
                    attempts: updated.attempts,
                })
            }
        }
    }

    /// The attempt write matched no record: either the record is gone, or
    /// another copy of this item recorded the attempt first.
    async fn superseded(&self, item: &DeliveryItem) -> Result<DeliveryOutcome, AppError> {
        let current = self
            .ledger
            .find_by_event_key(&item.event_key)
            .await?
            .ok_or_else(|| not_found(&item.event_key))?;

        tracing::warn!(
            event_key = %item.event_key,
            status = %current.status,
            attempts = current.attempts,
            "Attempt already recorded by a concurrent delivery, dropping duplicate"
        );
        Ok(DeliveryOutcome::Skipped {
            status: current.status,
        })
    }

    /// Invoke the send capability. Errors, refusals and timeouts all count as failure.
    async fn attempt(&self, sender: &dyn ChannelSender, item: &DeliveryItem) -> bool {
        let send = sender.send(&item.recipient, &item.content);
        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(Ok(true)) => true,
            Ok(Ok(false)) => {
                tracing::warn!(event_key = %item.event_key, channel = %item.channel, "Provider reported failure");
                false
            }
            Ok(Err(e)) => {
                tracing::warn!(event_key = %item.event_key, channel = %item.channel, error = %e, "Send failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    event_key = %item.event_key,
                    channel = %item.channel,
                    timeout_secs = self.send_timeout.as_secs(),
                    "Send timed out"
                );
                false
            }
        }
    }

    /// Consume the queue until `shutdown` fires. An attempt in progress is
    /// always finished before the loop exits.
    pub async fn run(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker_id, "Delivery worker started");
        let mut backoff = INFRA_BACKOFF_MIN;

        loop {
            let lease = tokio::select! {
                _ = shutdown.changed() => break,
                lease = self.queue.dequeue() => lease,
            };

            let lease = match lease {
                Ok(lease) => lease,
                Err(e) => {
                    tracing::error!(worker_id, error = %e, backoff_secs = backoff.as_secs(), "Queue unavailable");
                    if pause(backoff, &mut shutdown).await {
                        break;
                    }
                    backoff = (backoff * 2).min(INFRA_BACKOFF_MAX);
                    continue;
                }
            };

            match self.process(&lease.item).await {
                Ok(_) => {
                    backoff = INFRA_BACKOFF_MIN;
                    self.settle(&lease).await;
                }
                Err(e) if e.is_infrastructure() => {
                    tracing::error!(
                        worker_id,
                        event_key = %lease.item.event_key,
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "Infrastructure failure, returning item to the queue"
                    );
                    if let Err(e) = self.queue.release(&lease, backoff).await {
                        tracing::error!(
                            event_key = %lease.item.event_key,
                            error = %e,
                            "Failed to release lease; it will be redelivered after the visibility timeout"
                        );
                    }
                    if pause(backoff, &mut shutdown).await {
                        break;
                    }
                    backoff = (backoff * 2).min(INFRA_BACKOFF_MAX);
                }
                Err(e) => {
                    // Permanent: retrying cannot change the outcome
                    tracing::error!(
                        worker_id,
                        event_key = %lease.item.event_key,
                        channel = %lease.item.channel,
                        error = %e,
                        "Dropping undeliverable item"
                    );
                    self.settle(&lease).await;
                }
            }
        }

        tracing::info!(worker_id, "Delivery worker stopped");
    }

    async fn settle(&self, lease: &Lease) {
        if let Err(e) = self.queue.ack(lease).await {
            tracing::error!(
                event_key = %lease.item.event_key,
                error = %e,
                "Failed to acknowledge item; it may be redelivered"
            );
        }
    }
}

fn not_found(event_key: &str) -> AppError {
    AppError::NotFound(format!("Notification {} not found", event_key))
}

/// Sleep for `duration`. Returns `true` if shutdown was signalled meanwhile.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// A fixed set of delivery workers sharing one queue.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(worker: DeliveryWorker, concurrency: usize) -> Self {
        let (shutdown, receiver) = watch::channel(false);

        let handles = (0..concurrency.max(1))
            .map(|worker_id| {
                let worker = worker.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move { worker.run(worker_id, receiver).await })
            })
            .collect();

        tracing::info!(concurrency, "Worker pool started");
        Self { shutdown, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every worker to stop and wait for them to finish.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Delivery worker panicked");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}
