//! Error classification
//!
//! Decides whether a failed dispatch was upstream rate-limiting or a generic
//! failure. The answer only selects a backoff branch; both classes share the
//! same retry ceiling.

use std::time::Duration;

use crate::error::ExecutorError;

/// HTTP status the upstream uses for throttling
pub const RATE_LIMIT_STATUS: u16 = 429;

/// Lowercase message fragments that mark a rate-limit response
pub const RATE_LIMIT_PATTERNS: &[&str] = &["too many requests", "rate limit", "access denied"];

/// Failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Upstream throttling, with an optional server retry hint
    RateLimited { retry_after: Option<Duration> },

    /// Any other failure
    Generic,
}

impl Classification {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Classification::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Classification::RateLimited { retry_after } => *retry_after,
            Classification::Generic => None,
        }
    }
}

/// Classify an executor failure (first matching rule wins)
pub fn classify(err: &ExecutorError) -> Classification {
    let status_hit = [err.status, err.status_code].contains(&Some(RATE_LIMIT_STATUS));

    let rate_limited = status_hit || {
        let message = err.message.to_lowercase();
        RATE_LIMIT_PATTERNS.iter().any(|p| message.contains(p))
    };

    if rate_limited {
        Classification::RateLimited {
            retry_after: err.retry_after,
        }
    } else {
        Classification::Generic
    }
}
