//! Event Bus - pub/sub for scheduler events
//!
//! The EventBus uses a tokio broadcast channel to deliver events to all
//! subscribers. The scheduler emits, monitors subscribe. Emission never
//! blocks and never affects scheduling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use super::types::QueueEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Central event bus for scheduler activity
pub struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped, and slow
    /// subscribers lag rather than block the sender.
    pub fn emit(&self, event: QueueEvent) {
        debug!(
            event_type = event.event_type(),
            request_id = event.request_id(),
            "EventBus::emit"
        );
        // Ignore send errors (no subscribers is OK)
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    // === Convenience methods ===

    pub fn enqueued(&self, request_id: &str, operation: &str, queue_length: usize) {
        self.emit(QueueEvent::Enqueued {
            request_id: request_id.to_string(),
            operation: operation.to_string(),
            queue_length,
        });
    }

    pub fn high_load(&self, queue_length: usize, threshold: usize) {
        self.emit(QueueEvent::HighLoad {
            queue_length,
            threshold,
        });
    }

    pub fn request_completed(&self, request_id: &str, operation: &str, queue_length: usize) {
        self.emit(QueueEvent::RequestCompleted {
            request_id: request_id.to_string(),
            operation: operation.to_string(),
            queue_length,
        });
    }

    pub fn request_failed(&self, request_id: &str, operation: &str, error: &str, retry_count: u32) {
        self.emit(QueueEvent::RequestFailed {
            request_id: request_id.to_string(),
            operation: operation.to_string(),
            error: error.to_string(),
            retry_count,
        });
    }

    pub fn rate_limit_backoff(
        &self,
        request_id: &str,
        operation: &str,
        retry_count: u32,
        delay_ms: u64,
        next_retry_at: DateTime<Utc>,
        rate_limited: bool,
    ) {
        self.emit(QueueEvent::RateLimitBackoff {
            request_id: request_id.to_string(),
            operation: operation.to_string(),
            retry_count,
            delay_ms,
            next_retry_at,
            rate_limited,
        });
    }

    pub fn queue_cleared(&self, cleared: usize) {
        self.emit(QueueEvent::QueueCleared { cleared });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}
