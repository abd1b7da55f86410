//! Event Bus for scheduler observability
//!
//! Every state transition of a queued request emits a [`QueueEvent`] on a
//! broadcast channel. Monitors (the CLI, dashboards, tests) subscribe; the
//! scheduler never waits on them.
//!
//! ```text
//!   enqueue ──► Enqueued / HighLoad
//!   dispatch ─► RequestCompleted
//!            └► RateLimitBackoff ──► (retry) ──► ...
//!            └► RequestFailed
//!   clear ────► QueueCleared
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, create_event_bus};
pub use types::{EventLogEntry, QueueEvent};
