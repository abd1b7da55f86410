//! Integration tests for throttleq
//!
//! These tests drive the scheduler through its public API with
//! hand-written executors, under tokio's paused clock.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use throttleq::{
    EventBus, Executor, ExecutorError, LifecycleState, QueueError, QueueEvent, Scheduler, SchedulerConfig,
    UnimplementedExecutor,
};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Records every dispatch; fails any operation named in `fail_once` the
/// first time it is seen, with a JSON body shaped like a CRM throttle reply
#[derive(Default)]
struct RecordingExecutor {
    log: Mutex<Vec<(String, Instant)>>,
    fail_once: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    fn failing_once(ops: &[&str]) -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            fail_once: Mutex::new(ops.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn operations(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(op, _)| op.clone()).collect()
    }

    fn times(&self) -> Vec<Instant> {
        self.log.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn process(&self, operation: &str, payload: &Value) -> Result<Value, ExecutorError> {
        self.log.lock().unwrap().push((operation.to_string(), Instant::now()));

        let mut fail_once = self.fail_once.lock().unwrap();
        if let Some(pos) = fail_once.iter().position(|op| op == operation) {
            fail_once.remove(pos);
            return Err(ExecutorError::from_json(&json!({
                "code": "TOO_MANY_REQUESTS",
                "error_description": "You have made too many requests continuously. Please try again after some time.",
            })));
        }
        Ok(json!({ "operation": operation, "payload": payload }))
    }
}

/// Blocks inside `process` until released
struct GatedExecutor {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl Executor for GatedExecutor {
    async fn process(&self, operation: &str, _payload: &Value) -> Result<Value, ExecutorError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(json!(operation))
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_fifo_completion_order_and_spacing() {
    let exec = Arc::new(RecordingExecutor::default());
    let sched = Arc::new(Scheduler::new(SchedulerConfig::default(), exec.clone()));
    sched.start().await.unwrap();

    let mut handles = Vec::new();
    for op in ["a", "b", "c", "d", "e"] {
        handles.push(sched.enqueue(op, json!(null)).await);
    }

    let mut completed = Vec::new();
    for handle in handles {
        completed.push(handle.await.unwrap()["operation"].as_str().unwrap().to_string());
    }
    assert_eq!(completed, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(exec.operations(), completed);

    for pair in exec.times().windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(1_000));
    }

    sched.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_throttled_head_is_retried_before_waiting_work() {
    let exec = Arc::new(RecordingExecutor::failing_once(&["createDeal"]));
    let sched = Arc::new(Scheduler::new(SchedulerConfig::default(), exec.clone()));

    let deal = sched.enqueue("createDeal", json!({"amount": 10})).await;
    let contact = sched.enqueue("createContact", json!({"name": "x"})).await;
    let product = sched.enqueue("lookupProduct", json!({"upc": "123"})).await;
    sched.start().await.unwrap();

    deal.await.unwrap();
    contact.await.unwrap();
    product.await.unwrap();

    assert_eq!(
        exec.operations(),
        vec!["createDeal", "createDeal", "createContact", "lookupProduct"]
    );
    sched.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submitters() {
    let exec = Arc::new(RecordingExecutor::default());
    let sched = Arc::new(Scheduler::new(
        SchedulerConfig {
            request_interval_ms: 100,
            ..Default::default()
        },
        exec.clone(),
    ));
    sched.start().await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let sched = Arc::clone(&sched);
        tasks.push(tokio::spawn(async move {
            let handle = sched.enqueue(format!("op-{i}"), json!(i)).await;
            handle.await
        }));
    }

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    let status = sched.queue_status().await;
    assert_eq!(status.queue_length, 0);
    assert_eq!(status.stats.total_completed, 20);
    assert_eq!(exec.operations().len(), 20);

    sched.stop().await.unwrap();
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_placeholder_executor_exhausts_retries() {
    let sched = Arc::new(Scheduler::new(SchedulerConfig::default(), Arc::new(UnimplementedExecutor)));
    let mut rx = sched.subscribe();
    sched.start().await.unwrap();

    let handle = sched.enqueue("createDeal", json!(null)).await;
    let err = handle.await.unwrap_err();
    match &err {
        QueueError::RetriesExhausted { attempts, source } => {
            assert_eq!(*attempts, 4);
            assert!(source.message.contains("must be overridden"));
        }
        other => panic!("Expected RetriesExhausted, got {other:?}"),
    }

    let mut backoffs = 0;
    let mut failed = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            QueueEvent::RateLimitBackoff { rate_limited, .. } => {
                assert!(!rate_limited);
                backoffs += 1;
            }
            QueueEvent::RequestFailed { retry_count, .. } => {
                assert_eq!(retry_count, 3);
                failed += 1;
            }
            _ => {}
        }
    }
    assert_eq!(backoffs, 3);
    assert_eq!(failed, 1);

    sched.stop().await.unwrap();
}

// =============================================================================
// Clear and lifecycle
// =============================================================================

#[tokio::test]
async fn test_clear_leaves_in_flight_request_alone() {
    let exec = Arc::new(GatedExecutor {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let sched = Arc::new(Scheduler::new(
        SchedulerConfig {
            request_interval_ms: 0,
            ..Default::default()
        },
        exec.clone(),
    ));

    let in_flight = sched.enqueue("first", json!(null)).await;
    let mut queued = Vec::new();
    for i in 0..3 {
        queued.push(sched.enqueue("queued", json!(i)).await);
    }
    sched.start().await.unwrap();
    exec.entered.notified().await;

    let status = sched.queue_status().await;
    assert_eq!(status.in_flight.as_ref().map(|e| e.request_id.as_str()), Some(in_flight.id()));

    assert_eq!(sched.clear_queue().await, 3);
    assert_eq!(sched.queue_status().await.queue_length, 0);
    for handle in queued {
        assert!(matches!(handle.await, Err(QueueError::Cleared)));
    }

    exec.release.notify_one();
    assert_eq!(in_flight.await.unwrap(), json!("first"));

    sched.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_clear_leaves_backing_off_request_alone() {
    let exec = Arc::new(RecordingExecutor::failing_once(&["createDeal"]));
    let sched = Arc::new(Scheduler::new(SchedulerConfig::default(), exec.clone()));
    let mut rx = sched.subscribe();

    let deal = sched.enqueue("createDeal", json!({"amount": 10})).await;
    let contact = sched.enqueue("createContact", json!({"name": "x"})).await;
    let product = sched.enqueue("lookupProduct", json!({"upc": "123"})).await;
    sched.start().await.unwrap();

    loop {
        if let QueueEvent::RateLimitBackoff { request_id, .. } = rx.recv().await.unwrap() {
            assert_eq!(request_id, deal.id());
            break;
        }
    }

    let status = sched.queue_status().await;
    assert_eq!(status.in_flight.as_ref().map(|e| e.request_id.as_str()), Some(deal.id()));
    assert_eq!(sched.clear_queue().await, 2);
    assert!(contact.await.unwrap_err().is_cleared());
    assert!(product.await.unwrap_err().is_cleared());

    deal.await.unwrap();
    assert_eq!(exec.operations(), vec!["createDeal", "createDeal"]);

    sched.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_dispatch() {
    let exec = Arc::new(GatedExecutor {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let sched = Arc::new(Scheduler::new(SchedulerConfig::default(), exec.clone()));

    let first = sched.enqueue("first", json!(null)).await;
    let second = sched.enqueue("second", json!(null)).await;
    sched.start().await.unwrap();
    exec.entered.notified().await;

    let stopper = {
        let sched = Arc::clone(&sched);
        tokio::spawn(async move { sched.stop().await })
    };
    for _ in 0..100 {
        if sched.queue_status().await.state == LifecycleState::Draining {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(sched.queue_status().await.state, LifecycleState::Draining);

    exec.release.notify_one();
    stopper.await.unwrap().unwrap();

    assert_eq!(first.await.unwrap(), json!("first"));
    let status = sched.queue_status().await;
    assert_eq!(status.state, LifecycleState::Stopped);
    assert_eq!(status.queue_length, 1);

    assert_eq!(sched.clear_queue().await, 1);
    assert!(second.await.unwrap_err().is_cleared());
}

#[tokio::test(start_paused = true)]
async fn test_shared_event_bus() {
    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let sched = Arc::new(
        Scheduler::new(SchedulerConfig::default(), Arc::new(RecordingExecutor::default()))
            .with_event_bus(Arc::clone(&bus)),
    );

    let handle = sched.enqueue("lookupProduct", json!({"upc": "1"})).await;
    sched.start().await.unwrap();
    handle.await.unwrap();
    sched.stop().await.unwrap();

    let mut types = Vec::new();
    while let Ok(event) = rx.try_recv() {
        types.push(event.event_type());
    }
    assert_eq!(
        types,
        vec!["Enqueued", "SchedulerStarted", "RequestCompleted", "SchedulerStopped"]
    );
}
