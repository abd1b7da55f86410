//! Error types

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Failure descriptor returned by an executor for one dispatch
///
/// Carries enough of the upstream response for classification: the two
/// conventional status fields (`status` and `statusCode`), the message, and
/// an optional server-supplied retry hint.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ExecutorError {
    pub message: String,
    pub status: Option<u16>,
    pub status_code: Option<u16>,
    pub retry_after: Option<Duration>,
}

impl ExecutorError {
    /// Create an error with only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            status_code: None,
            retry_after: None,
        }
    }

    /// Set the `status` field
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the `statusCode` field
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Attach a server-supplied retry hint
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Build from a JSON error body
    ///
    /// Reads `status`, `statusCode`, `message` (falling back to
    /// `error_description`, then `error`) and a `retryAfter`/`retry_after`
    /// hint in seconds, given as a number or a numeric string.
    pub fn from_json(body: &Value) -> Self {
        let message = ["message", "error_description", "error"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());

        Self {
            message,
            status: status_field(body, "status"),
            status_code: status_field(body, "statusCode"),
            retry_after: ["retryAfter", "retry_after"]
                .iter()
                .find_map(|key| body.get(*key).and_then(seconds_field)),
        }
    }
}

fn status_field(body: &Value, key: &str) -> Option<u16> {
    match body.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn seconds_field(value: &Value) -> Option<Duration> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if secs.is_finite() && secs >= 0.0 {
        // Past Duration's range the hint saturates; the backoff policy caps it
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    } else {
        None
    }
}

/// Terminal failure delivered to a submitter through its completion handle
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue cleared")]
    Cleared,

    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: ExecutorError,
    },

    #[error("Request abandoned before it was settled")]
    Abandoned,
}

impl QueueError {
    /// Check if this request was removed by a queue clear
    pub fn is_cleared(&self) -> bool {
        matches!(self, QueueError::Cleared)
    }

    /// The last executor error, if the request ran out of retries
    pub fn executor_error(&self) -> Option<&ExecutorError> {
        match self {
            QueueError::RetriesExhausted { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Lifecycle misuse of the scheduler
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,
}
