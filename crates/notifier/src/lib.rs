//! Asynchronous notification delivery engine.
//!
//! Producers submit notifications through [`service::NotificationService`],
//! which records them in the [`ledger`] and schedules a typed work item on the
//! [`queue`]. A pool of [`worker::DeliveryWorker`]s consumes the queue, sends
//! through the [`channels`] router, and applies the [`retry`] policy on failure.

pub mod channels;
pub mod ledger;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod service;
pub mod worker;
