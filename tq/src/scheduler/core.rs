//! Scheduler implementation

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::classify::classify;
use crate::clock::{Clock, TokioClock};
use crate::error::{ExecutorError, QueueError, SchedulerError};
use crate::events::{EventBus, QueueEvent};
use crate::executor::Executor;

use super::config::{RetryPlacement, SchedulerConfig};
use super::queue::{LifecycleState, QueueEntry, QueueEntryStatus, QueueStatus, RequestQueue, SchedulerStats};
use super::request::{CompletionHandle, QueuedRequest};

/// Internal state protected by mutex
struct SchedulerInner {
    queue: RequestQueue,

    /// Start of the most recent dispatch attempt, for spacing
    last_dispatch: Option<Instant>,
    last_dispatch_at: Option<DateTime<Utc>>,

    /// Request currently held by the worker
    in_flight: Option<QueueEntry>,

    /// Back-to-back head reinsertions since the last terminal outcome
    consecutive_retries: u32,

    state: LifecycleState,
    stats: SchedulerStats,
}

/// Single-worker outbound request scheduler
///
/// Requests are dispatched one at a time, at least `request_interval` apart.
/// Failures are classified and retried with backoff, the retried request
/// going back to the head of the queue. The worker holds an `Arc` to the
/// scheduler, so call [`stop`](Self::stop) before dropping it.
pub struct Scheduler {
    config: SchedulerConfig,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    inner: Mutex<SchedulerInner>,
    notify: Notify,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a stopped scheduler with its own event bus and the tokio clock
    pub fn new(config: SchedulerConfig, executor: Arc<dyn Executor>) -> Self {
        debug!(?config, "Scheduler::new: called");
        let events = Arc::new(EventBus::new(config.event_capacity));
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            executor,
            clock: Arc::new(TokioClock),
            events,
            inner: Mutex::new(SchedulerInner {
                queue: RequestQueue::new(),
                last_dispatch: None,
                last_dispatch_at: None,
                in_flight: None,
                consecutive_retries: 0,
                state: LifecycleState::Stopped,
                stats: SchedulerStats::default(),
            }),
            notify: Notify::new(),
            shutdown,
            worker: Mutex::new(None),
        }
    }

    /// Use a different time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish on a shared event bus instead of a private one
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Enqueue with the configured default retry ceiling
    pub async fn enqueue(&self, operation: impl Into<String>, payload: Value) -> CompletionHandle {
        self.enqueue_with_retries(operation, payload, self.config.default_max_retries)
            .await
    }

    /// Append a request to the tail and return its pending completion handle
    ///
    /// Never waits on the worker; only the queue lock is taken.
    pub async fn enqueue_with_retries(
        &self,
        operation: impl Into<String>,
        payload: Value,
        max_retries: u32,
    ) -> CompletionHandle {
        let (request, handle) = QueuedRequest::new(operation, payload, max_retries);
        debug!(request_id = %request.id, operation = %request.operation, max_retries, "Scheduler::enqueue: called");
        let request_id = request.id.clone();
        let operation = request.operation.clone();

        let mut inner = self.inner.lock().await;
        let prior_length = inner.queue.len();
        inner.queue.append(request);
        let queue_length = inner.queue.len();
        inner.stats.total_enqueued += 1;
        inner.stats.peak_queue_depth = inner.stats.peak_queue_depth.max(queue_length);
        drop(inner);

        self.events.enqueued(&request_id, &operation, queue_length);

        let threshold = self.config.high_load_threshold;
        if prior_length > threshold {
            warn!(queue_length, threshold, "Queue under high load");
            self.events.high_load(queue_length, threshold);
        }

        self.notify.notify_one();
        handle
    }

    /// Drop every queued request, failing each with [`QueueError::Cleared`]
    ///
    /// The request held by the worker (dispatching or backing off) is not
    /// affected. Returns the number of requests cleared.
    pub async fn clear_queue(&self) -> usize {
        debug!("Scheduler::clear_queue: called");
        let drained = {
            let mut inner = self.inner.lock().await;
            let drained = inner.queue.drain();
            inner.stats.total_cleared += drained.len() as u64;
            drained
        };

        let cleared = drained.len();
        for request in drained {
            request.settle(Err(QueueError::Cleared));
        }

        info!(cleared, "Queue cleared");
        self.events.queue_cleared(cleared);
        cleared
    }

    /// Get a status snapshot
    pub async fn queue_status(&self) -> QueueStatus {
        debug!("Scheduler::queue_status: called");
        let inner = self.inner.lock().await;
        QueueStatus {
            queue_length: inner.queue.len(),
            is_processing_active: inner.state != LifecycleState::Stopped,
            last_dispatch_time: inner.last_dispatch_at,
            state: inner.state,
            in_flight: inner.in_flight.clone(),
            stats: inner.stats.clone(),
        }
    }

    /// In-flight request first, then the queue in dispatch order
    pub async fn queue_details(&self) -> Vec<QueueEntry> {
        debug!("Scheduler::queue_details: called");
        let inner = self.inner.lock().await;
        inner
            .in_flight
            .iter()
            .cloned()
            .chain(
                inner
                    .queue
                    .iter()
                    .map(|r| QueueEntry::from_request(r, QueueEntryStatus::Queued)),
            )
            .collect()
    }

    /// Get the scheduler statistics
    pub async fn stats(&self) -> SchedulerStats {
        debug!("Scheduler::stats: called");
        self.inner.lock().await.stats.clone()
    }

    /// Spawn the worker loop
    pub async fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        debug!("Scheduler::start: called");
        let mut worker = self.worker.lock().await;
        {
            let mut inner = self.inner.lock().await;
            if inner.state != LifecycleState::Stopped {
                debug!(state = ?inner.state, "Scheduler::start: not stopped, rejecting");
                return Err(SchedulerError::AlreadyRunning);
            }
            inner.state = LifecycleState::Running;
        }

        self.shutdown.send_replace(false);
        let shutdown_rx = self.shutdown.subscribe();
        *worker = Some(tokio::spawn(Arc::clone(self).run(shutdown_rx)));

        info!(interval_ms = self.config.request_interval_ms, "Scheduler started");
        Ok(())
    }

    /// Stop the worker and wait for it to exit
    ///
    /// An in-flight executor call runs to completion and its request is
    /// settled or re-queued as usual. Idle, spacing and backoff waits are cut
    /// short; a request interrupted in its backoff wait goes back to the head
    /// with its retry counted. Queued requests stay queued for the next start.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        debug!("Scheduler::stop: called");
        {
            let mut inner = self.inner.lock().await;
            if inner.state != LifecycleState::Running {
                debug!(state = ?inner.state, "Scheduler::stop: not running, rejecting");
                return Err(SchedulerError::NotRunning);
            }
            inner.state = LifecycleState::Draining;
        }

        info!("Scheduler draining");
        self.shutdown.send_replace(true);

        let handle = self.worker.lock().await.take();
        let joined = match handle {
            Some(handle) => handle.await,
            None => Ok(()),
        };

        {
            let mut inner = self.inner.lock().await;
            inner.state = LifecycleState::Stopped;
            inner.in_flight = None;
        }

        if let Err(e) = joined {
            error!(error = %e, "Scheduler worker terminated abnormally");
            if e.is_panic() {
                std::panic::resume_unwind(e.into_panic());
            }
        }
        info!("Scheduler stopped");
        Ok(())
    }

    /// Worker loop: one request at a time until shutdown
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        debug!("Scheduler::run: worker started");
        self.events.emit(QueueEvent::SchedulerStarted);

        loop {
            if *shutdown.borrow() {
                debug!("Scheduler::run: shutdown observed");
                break;
            }

            let next = {
                let mut inner = self.inner.lock().await;
                let next = inner.queue.take_head();
                inner.in_flight = next
                    .as_ref()
                    .map(|r| QueueEntry::from_request(r, QueueEntryStatus::InFlight));
                next
            };

            let Some(request) = next else {
                debug!("Scheduler::run: queue empty, waiting for enqueue");
                tokio::select! {
                    _ = self.notify.notified() => {}
                    _ = shutdown.changed() => break,
                }
                continue;
            };

            if !self.process(request, &mut shutdown).await {
                break;
            }
        }

        let queue_length = self.inner.lock().await.queue.len();
        debug!(queue_length, "Scheduler::run: worker exiting");
        self.events.emit(QueueEvent::SchedulerStopped { queue_length });
    }

    /// Dispatch one request; returns false if shutdown interrupted a wait
    async fn process(&self, request: QueuedRequest, shutdown: &mut watch::Receiver<bool>) -> bool {
        let spacing = self.spacing_remaining().await;
        if !spacing.is_zero() {
            debug!(request_id = %request.id, ?spacing, "Scheduler::process: waiting for spacing");
            if !self.sleep_unless_shutdown(spacing, shutdown).await {
                debug!(request_id = %request.id, "Scheduler::process: shutdown during spacing, returning to head");
                self.return_to_head(request).await;
                return false;
            }
        }

        {
            let mut inner = self.inner.lock().await;
            inner.last_dispatch = Some(self.clock.now());
            inner.last_dispatch_at = Some(Utc::now());
            inner.stats.total_dispatched += 1;
        }

        debug!(
            request_id = %request.id,
            operation = %request.operation,
            retry_count = request.retry_count,
            "Scheduler::process: dispatching"
        );
        let outcome = AssertUnwindSafe(self.executor.process(&request.operation, &request.payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ExecutorError::new(panic_message(panic.as_ref()))));
        match outcome {
            Ok(result) => {
                self.complete(request, result).await;
                true
            }
            Err(err) => self.fail(request, err, shutdown).await,
        }
    }

    async fn complete(&self, request: QueuedRequest, result: Value) {
        let queue_length = {
            let mut inner = self.inner.lock().await;
            inner.in_flight = None;
            inner.consecutive_retries = 0;
            inner.stats.total_completed += 1;
            inner.queue.len()
        };

        debug!(request_id = %request.id, operation = %request.operation, "Scheduler::complete: succeeded");
        let request_id = request.id.clone();
        let operation = request.operation.clone();
        request.settle(Ok(result));
        self.events.request_completed(&request_id, &operation, queue_length);
    }

    async fn fail(&self, mut request: QueuedRequest, err: ExecutorError, shutdown: &mut watch::Receiver<bool>) -> bool {
        let classification = classify(&err);
        if classification.is_rate_limited() {
            self.inner.lock().await.stats.total_rate_limited += 1;
        }

        if !request.has_retries_left() {
            {
                let mut inner = self.inner.lock().await;
                inner.in_flight = None;
                inner.consecutive_retries = 0;
                inner.stats.total_failed += 1;
            }

            warn!(
                request_id = %request.id,
                operation = %request.operation,
                retry_count = request.retry_count,
                error = %err,
                "Request failed, retries exhausted"
            );
            self.events
                .request_failed(&request.id, &request.operation, &err.to_string(), request.retry_count);
            let attempts = request.retry_count + 1;
            request.settle(Err(QueueError::RetriesExhausted { attempts, source: err }));
            return true;
        }

        let delay = self.config.backoff.delay(request.retry_count, classification);
        let next_retry_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        warn!(
            request_id = %request.id,
            operation = %request.operation,
            retry_count = request.retry_count,
            rate_limited = classification.is_rate_limited(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Dispatch failed, backing off"
        );
        self.events.rate_limit_backoff(
            &request.id,
            &request.operation,
            request.retry_count,
            delay.as_millis() as u64,
            next_retry_at,
            classification.is_rate_limited(),
        );

        let finished = self.sleep_unless_shutdown(delay, shutdown).await;
        request.record_retry();
        if finished {
            self.requeue_retry(request).await;
        } else {
            debug!(request_id = %request.id, "Scheduler::fail: shutdown during backoff, returning to head");
            self.return_to_head(request).await;
        }
        finished
    }

    /// Reinsert a retried request according to the placement policy
    async fn requeue_retry(&self, request: QueuedRequest) {
        let mut inner = self.inner.lock().await;
        inner.in_flight = None;
        inner.stats.total_retries += 1;

        let to_head = match self.config.retry_placement {
            RetryPlacement::Head => true,
            RetryPlacement::Bounded { max_consecutive } => inner.consecutive_retries < max_consecutive,
        };

        debug!(request_id = %request.id, retry_count = request.retry_count, to_head, "Scheduler::requeue_retry: called");
        if to_head {
            inner.consecutive_retries += 1;
            inner.queue.insert_at_head(request);
        } else {
            inner.consecutive_retries = 0;
            inner.queue.append(request);
        }
    }

    /// Put back a request that was taken but never dispatched
    async fn return_to_head(&self, request: QueuedRequest) {
        let mut inner = self.inner.lock().await;
        inner.in_flight = None;
        inner.queue.insert_at_head(request);
    }

    async fn spacing_remaining(&self) -> Duration {
        let inner = self.inner.lock().await;
        match inner.last_dispatch {
            Some(last) => {
                let elapsed = self.clock.now().saturating_duration_since(last);
                self.config.request_interval().saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        }
    }

    /// Sleep on the clock; false if shutdown was requested first
    async fn sleep_unless_shutdown(&self, duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            _ = self.clock.sleep(duration) => true,
            _ = shutdown.changed() => false,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Executor panicked: {detail}")
}
