//! Event types for scheduler observability
//!
//! These events describe every transition a queued request goes through:
//! - Ingress (enqueue, high load)
//! - Outcomes (completed, failed)
//! - Retries (backoff)
//! - Lifecycle (started, stopped, cleared)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduler event vocabulary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueueEvent {
    // === Ingress ===
    /// A request was appended to the queue
    Enqueued {
        request_id: String,
        operation: String,
        queue_length: usize,
    },
    /// An enqueue arrived while the queue was already over the threshold
    HighLoad { queue_length: usize, threshold: usize },

    // === Outcomes ===
    /// A request's executor call succeeded
    RequestCompleted {
        request_id: String,
        operation: String,
        queue_length: usize,
    },
    /// A request exhausted its retries
    RequestFailed {
        request_id: String,
        operation: String,
        error: String,
        retry_count: u32,
    },

    // === Retries ===
    /// The scheduler is pausing before retrying a failed request
    RateLimitBackoff {
        request_id: String,
        operation: String,
        retry_count: u32,
        delay_ms: u64,
        next_retry_at: DateTime<Utc>,
        rate_limited: bool,
    },

    // === Lifecycle ===
    /// Pending requests were dropped by a clear
    QueueCleared { cleared: usize },
    /// The worker loop started
    SchedulerStarted,
    /// The worker loop exited
    SchedulerStopped { queue_length: usize },
}

impl QueueEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::Enqueued { .. } => "Enqueued",
            QueueEvent::HighLoad { .. } => "HighLoad",
            QueueEvent::RequestCompleted { .. } => "RequestCompleted",
            QueueEvent::RequestFailed { .. } => "RequestFailed",
            QueueEvent::RateLimitBackoff { .. } => "RateLimitBackoff",
            QueueEvent::QueueCleared { .. } => "QueueCleared",
            QueueEvent::SchedulerStarted => "SchedulerStarted",
            QueueEvent::SchedulerStopped { .. } => "SchedulerStopped",
        }
    }

    /// Get the request ID, for events about a single request
    pub fn request_id(&self) -> Option<&str> {
        match self {
            QueueEvent::Enqueued { request_id, .. }
            | QueueEvent::RequestCompleted { request_id, .. }
            | QueueEvent::RequestFailed { request_id, .. }
            | QueueEvent::RateLimitBackoff { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

/// Timestamped wrapper, for consumers that record events
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: QueueEvent,
}

impl EventLogEntry {
    pub fn new(event: QueueEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
