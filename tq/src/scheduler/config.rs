//! Scheduler configuration

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::events::DEFAULT_CHANNEL_CAPACITY;

/// Where a failed request goes when it is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RetryPlacement {
    /// Always back to the head: retries starve fresh work while the
    /// upstream keeps failing
    #[default]
    Head,

    /// Head, but after `max_consecutive` back-to-back head reinsertions the
    /// next retry goes to the tail so waiting work gets a turn
    Bounded {
        #[serde(rename = "max-consecutive")]
        max_consecutive: u32,
    },
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minimum spacing between dispatch attempts in milliseconds
    #[serde(rename = "request-interval-ms", default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Retry ceiling for requests enqueued without one
    #[serde(rename = "default-max-retries", default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Queue depth above which an enqueue emits a high-load event
    #[serde(rename = "high-load-threshold", default = "default_high_load_threshold")]
    pub high_load_threshold: usize,

    /// Event bus channel capacity
    #[serde(rename = "event-capacity", default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(rename = "retry-placement", default)]
    pub retry_placement: RetryPlacement,

    #[serde(default)]
    pub backoff: BackoffPolicy,
}

fn default_request_interval_ms() -> u64 {
    1_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_high_load_threshold() -> usize {
    50
}

fn default_event_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            request_interval_ms: default_request_interval_ms(),
            default_max_retries: default_max_retries(),
            high_load_threshold: default_high_load_threshold(),
            event_capacity: default_event_capacity(),
            retry_placement: RetryPlacement::default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Get the request interval as a Duration
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.high_load_threshold == 0 {
            return Err(eyre!("scheduler.high-load-threshold must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(eyre!("scheduler.event-capacity must be at least 1"));
        }
        if self.backoff.table_ms.is_empty() {
            return Err(eyre!("scheduler.backoff.table-ms must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter_ratio) {
            return Err(eyre!(
                "scheduler.backoff.jitter-ratio must be between 0.0 and 1.0, got {}",
                self.backoff.jitter_ratio
            ));
        }
        Ok(())
    }
}
