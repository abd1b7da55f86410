//! Clock and sleep primitive
//!
//! Every timing decision the scheduler makes (spacing, backoff) goes through
//! a [`Clock`], so the worker can be driven by tokio's paused test clock or
//! any other time source.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Monotonic time plus suspend-for-duration
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Suspend the calling task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
