//! Prometheus counters for delivery outcomes, labelled by channel.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use herald_common::error::AppError;
use herald_common::types::Channel;

pub struct DeliveryMetrics {
    registry: Registry,
    sent: IntCounterVec,
    failed: IntCounterVec,
    retried: IntCounterVec,
}

impl DeliveryMetrics {
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new();

        let sent = counter(
            &registry,
            "herald_notifications_sent_total",
            "Total notifications sent",
        )?;
        let failed = counter(
            &registry,
            "herald_notifications_failed_total",
            "Total notifications that exhausted their attempts",
        )?;
        let retried = counter(
            &registry,
            "herald_notifications_retried_total",
            "Total failed attempts scheduled for retry",
        )?;

        Ok(Self {
            registry,
            sent,
            failed,
            retried,
        })
    }

    pub fn record_sent(&self, channel: Channel) {
        self.sent.with_label_values(&[channel.as_str()]).inc();
    }

    pub fn record_failed(&self, channel: Channel) {
        self.failed.with_label_values(&[channel.as_str()]).inc();
    }

    pub fn record_retry(&self, channel: Channel) {
        self.retried.with_label_values(&[channel.as_str()]).inc();
    }

    pub fn sent_count(&self, channel: Channel) -> u64 {
        self.sent.with_label_values(&[channel.as_str()]).get()
    }

    pub fn failed_count(&self, channel: Channel) -> u64 {
        self.failed.with_label_values(&[channel.as_str()]).get()
    }

    pub fn retried_count(&self, channel: Channel) -> u64 {
        self.retried.with_label_values(&[channel.as_str()]).get()
    }

    /// Render all counters in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AppError::Internal(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| AppError::Internal(format!("Metrics are not valid UTF-8: {}", e)))
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounterVec, AppError> {
    let counter = IntCounterVec::new(Opts::new(name, help), &["channel"])
        .map_err(|e| AppError::Internal(format!("Invalid metric {}: {}", name, e)))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| AppError::Internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(counter)
}
