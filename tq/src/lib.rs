//! throttleq - rate-limited outbound request scheduler
//!
//! Sits in front of a throttled third-party API (a CRM, typically) and makes
//! sure calls are never issued faster than the upstream tolerates, while
//! recovering from throttling and transient failures without losing or
//! duplicating work.
//!
//! # Core Concepts
//!
//! - **One in flight**: a single worker dispatches requests one at a time
//! - **Spacing**: consecutive dispatch attempts are at least `request-interval-ms` apart
//! - **Classified retries**: 429s and throttling messages walk a backoff table,
//!   other failures wait a fixed delay
//! - **Retries first**: a retried request goes back to the head of the queue
//!
//! # Modules
//!
//! - [`scheduler`] - Queue, worker loop, completion handles
//! - [`executor`] - The upstream-call capability the embedding app supplies
//! - [`classify`] - Rate-limit detection
//! - [`backoff`] - Retry delay policy
//! - [`events`] - Event bus for monitoring
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod backoff;
pub mod classify;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod scheduler;
pub mod simulate;

// Re-export commonly used types
pub use backoff::BackoffPolicy;
pub use classify::{Classification, classify};
pub use clock::{Clock, TokioClock};
pub use config::Config;
pub use error::{ExecutorError, QueueError, SchedulerError};
pub use events::{EventBus, EventLogEntry, QueueEvent, create_event_bus};
pub use executor::{Executor, UnimplementedExecutor};
pub use scheduler::{
    CompletionHandle, LifecycleState, QueueEntry, QueueEntryStatus, QueueStatus, RetryPlacement, Scheduler,
    SchedulerConfig, SchedulerStats,
};
