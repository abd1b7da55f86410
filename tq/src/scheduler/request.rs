//! Queued requests and their completion handles

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::error::QueueError;

/// Outcome delivered to a submitter
pub type Outcome = Result<Value, QueueError>;

/// One submitted unit of work
///
/// Owns the sending half of its completion channel. Settling consumes the
/// request, so it can be settled at most once.
#[derive(Debug)]
pub struct QueuedRequest {
    pub id: String,
    pub operation: String,
    pub payload: Value,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    completion: oneshot::Sender<Outcome>,
}

impl QueuedRequest {
    /// Create a request and the handle its submitter will await
    pub fn new(operation: impl Into<String>, payload: Value, max_retries: u32) -> (Self, CompletionHandle) {
        let id = Uuid::now_v7().to_string();
        let (tx, rx) = oneshot::channel();

        let request = Self {
            id: id.clone(),
            operation: operation.into(),
            payload,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
            completion: tx,
        };
        (request, CompletionHandle { id, rx })
    }

    /// Whether another attempt is allowed after a failure
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Count one retry; callers check [`has_retries_left`](Self::has_retries_left) first
    pub(crate) fn record_retry(&mut self) {
        debug_assert!(self.has_retries_left());
        self.retry_count = (self.retry_count + 1).min(self.max_retries);
    }

    /// Deliver the final outcome to the submitter
    pub(crate) fn settle(self, outcome: Outcome) {
        if self.completion.send(outcome).is_err() {
            debug!(request_id = %self.id, "QueuedRequest::settle: submitter dropped its handle");
        }
    }
}

/// Submitter's side of a request: resolves once, with the executor's result
/// or a terminal [`QueueError`]
#[derive(Debug)]
pub struct CompletionHandle {
    id: String,
    rx: oneshot::Receiver<Outcome>,
}

impl CompletionHandle {
    /// ID of the request this handle belongs to
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for CompletionHandle {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(QueueError::Abandoned)))
    }
}
