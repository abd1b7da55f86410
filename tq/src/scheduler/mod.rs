//! Outbound request scheduler
//!
//! One worker drains a FIFO queue, spacing dispatches to respect the
//! upstream's rate limit and retrying failures with backoff at the head of
//! the queue.

mod config;
mod core;
mod queue;
mod request;

pub use config::{RetryPlacement, SchedulerConfig};
pub use core::Scheduler;
pub use queue::{LifecycleState, QueueEntry, QueueEntryStatus, QueueStatus, RequestQueue, SchedulerStats};
pub use request::{CompletionHandle, Outcome, QueuedRequest};
