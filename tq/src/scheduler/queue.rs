//! Queue types for the scheduler

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::request::QueuedRequest;

/// Ordered pending work
///
/// FIFO for fresh requests; the retry path puts failed requests back at the
/// head. Nothing leaves the queue except through `take_head` or `drain`.
#[derive(Debug, Default)]
pub struct RequestQueue {
    items: VecDeque<QueuedRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to the tail
    pub fn append(&mut self, request: QueuedRequest) {
        self.items.push_back(request);
    }

    /// Remove and return the head
    pub fn take_head(&mut self) -> Option<QueuedRequest> {
        self.items.pop_front()
    }

    /// Put a request back in front of everything waiting
    pub fn insert_at_head(&mut self, request: QueuedRequest) {
        self.items.push_front(request);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove every pending request, head first
    pub fn drain(&mut self) -> Vec<QueuedRequest> {
        self.items.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedRequest> {
        self.items.iter()
    }
}

/// Worker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Stopped,
    Running,
    /// Stop requested; finishing the in-flight dispatch
    Draining,
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub total_enqueued: u64,
    pub total_dispatched: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_retries: u64,
    pub total_rate_limited: u64,
    pub total_cleared: u64,
    pub peak_queue_depth: usize,
}

/// Read-only snapshot of the scheduler
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    /// True while a worker loop exists (running or draining)
    pub is_processing_active: bool,
    /// Wall-clock start of the most recent dispatch attempt
    pub last_dispatch_time: Option<DateTime<Utc>>,
    pub state: LifecycleState,
    pub in_flight: Option<QueueEntry>,
    pub stats: SchedulerStats,
}

/// Queue entry for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub request_id: String,
    pub operation: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub status: QueueEntryStatus,
}

impl QueueEntry {
    pub(crate) fn from_request(request: &QueuedRequest, status: QueueEntryStatus) -> Self {
        Self {
            request_id: request.id.clone(),
            operation: request.operation.clone(),
            retry_count: request.retry_count,
            max_retries: request.max_retries,
            created_at: request.created_at,
            status,
        }
    }
}

/// Status of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueEntryStatus {
    /// Held by the worker: dispatching or backing off
    InFlight,
    Queued,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(op: &str) -> QueuedRequest {
        QueuedRequest::new(op, json!(null), 3).0
    }

    fn ops(queue: &RequestQueue) -> Vec<String> {
        queue.iter().map(|r| r.operation.clone()).collect()
    }

    #[test]
    fn test_fifo() {
        let mut queue = RequestQueue::new();
        queue.append(request("a"));
        queue.append(request("b"));
        queue.append(request("c"));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.take_head().unwrap().operation, "a");
        assert_eq!(queue.take_head().unwrap().operation, "b");
        assert_eq!(queue.take_head().unwrap().operation, "c");
        assert!(queue.take_head().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_insert_at_head_jumps_the_line() {
        let mut queue = RequestQueue::new();
        queue.append(request("a"));
        queue.append(request("b"));

        let retried = queue.take_head().unwrap();
        queue.append(request("c"));
        queue.insert_at_head(retried);

        assert_eq!(ops(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_drain() {
        let mut queue = RequestQueue::new();
        queue.append(request("a"));
        queue.append(request("b"));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].operation, "a");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_entry_from_request() {
        let req = request("createDeal");
        let entry = QueueEntry::from_request(&req, QueueEntryStatus::Queued);
        assert_eq!(entry.request_id, req.id);
        assert_eq!(entry.operation, "createDeal");
        assert_eq!(entry.max_retries, 3);
        assert_eq!(entry.status, QueueEntryStatus::Queued);
    }
}
