//! Retry controller: decides what happens after a delivery attempt fails.
//!
//! The controller is pure: it never sleeps and never touches the queue. The
//! delivery worker feeds it the attempt count *after* the failed attempt has
//! been counted and acts on the returned [`RetryDecision`].
//!
//! Delay for a retry is `base_delay × multiplier^attempts`, capped at `max_delay`.

use std::time::Duration;

use herald_common::config::AppConfig;

/// Default maximum number of attempts, first send included.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay in seconds.
const DEFAULT_BASE_DELAY_SECS: u64 = 10;

/// Default backoff multiplier.
const DEFAULT_MULTIPLIER: u32 = 2;

/// Default ceiling for a single retry delay in seconds.
const DEFAULT_MAX_DELAY_SECS: u64 = 600;

/// Per-attempt delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    /// Not yet attempted, or waiting for a scheduled re-attempt.
    Pending,
    /// The send capability is executing.
    Attempting,
    /// Terminal: the provider accepted the notification.
    Succeeded,
    /// Terminal: every allowed attempt failed.
    ExhaustedFailure,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Succeeded | AttemptState::ExhaustedFailure)
    }
}

/// Outcome of consulting the controller after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue the item after `delay`.
    Retry { delay: Duration },
    /// Attempts are exhausted; the record becomes `failed`.
    GiveUp,
}

impl RetryDecision {
    pub fn next_state(&self) -> AttemptState {
        match self {
            RetryDecision::Retry { .. } => AttemptState::Pending,
            RetryDecision::GiveUp => AttemptState::ExhaustedFailure,
        }
    }
}

/// Bounded exponential-backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryController {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
}

impl RetryController {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: multiplier.max(2),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.retry_max_attempts,
            Duration::from_secs(config.retry_base_delay_secs),
            config.retry_backoff_multiplier,
        )
        .with_max_delay(Duration::from_secs(config.retry_max_delay_secs))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what to do after a failed attempt.
    ///
    /// `attempts` is the record's attempt count including the attempt that just failed.
    pub fn on_failure(&self, attempts: u32) -> RetryDecision {
        if attempts >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry {
                delay: self.delay_for(attempts),
            }
        }
    }

    /// State after a successful attempt. Success is always terminal.
    pub fn on_success(&self) -> AttemptState {
        AttemptState::Succeeded
    }

    /// Backoff delay before the next attempt, given `attempts` already made.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempts)
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_secs(DEFAULT_BASE_DELAY_SECS),
            DEFAULT_MULTIPLIER,
        )
    }
}
