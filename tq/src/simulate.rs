//! Simulated upstream for exercising the scheduler end to end
//!
//! The simulated CRM throttles or fails on a fixed cadence so backoff,
//! spacing and head-of-line retries can be watched from the CLI.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use colored::Colorize;
use eyre::Result;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::ExecutorError;
use crate::events::{EventLogEntry, QueueEvent};
use crate::executor::Executor;
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerStats};

const OPERATIONS: &[&str] = &["createDeal", "lookupProduct", "createContact"];

/// Upstream stand-in that throttles every Nth call and fails every Mth call
pub struct SimulatedUpstream {
    calls: AtomicU64,
    rate_limit_every: u64,
    fail_every: u64,
    latency: Duration,
}

impl SimulatedUpstream {
    /// A cadence of 0 disables that kind of failure
    pub fn new(rate_limit_every: u64, fail_every: u64, latency: Duration) -> Self {
        debug!(rate_limit_every, fail_every, ?latency, "SimulatedUpstream::new: called");
        Self {
            calls: AtomicU64::new(0),
            rate_limit_every,
            fail_every,
            latency,
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn hits(call: u64, every: u64) -> bool {
    every > 0 && call % every == 0
}

#[async_trait]
impl Executor for SimulatedUpstream {
    async fn process(&self, operation: &str, payload: &Value) -> Result<Value, ExecutorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(call, %operation, "SimulatedUpstream::process: called");
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if hits(call, self.rate_limit_every) {
            return Err(ExecutorError::from_json(&json!({
                "status": 429,
                "message": "Too Many Requests",
            })));
        }
        if hits(call, self.fail_every) {
            return Err(ExecutorError::from_json(&json!({
                "statusCode": 500,
                "message": "Internal server error",
            })));
        }

        Ok(json!({
            "operation": operation,
            "call": call,
            "echo": payload,
        }))
    }
}

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub count: usize,
    pub rate_limit_every: u64,
    pub fail_every: u64,
    pub latency: Duration,
    /// Print events as JSON lines instead of text
    pub json: bool,
}

/// Outcome of a simulation run
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub succeeded: usize,
    pub failed: usize,
    pub upstream_calls: u64,
    pub stats: SchedulerStats,
    pub elapsed: Duration,
}

/// Run `count` requests through a scheduler backed by [`SimulatedUpstream`]
pub async fn run_simulation(config: SchedulerConfig, options: SimulationOptions) -> Result<SimulationReport> {
    info!(?options, "Starting simulation");
    let upstream = Arc::new(SimulatedUpstream::new(
        options.rate_limit_every,
        options.fail_every,
        options.latency,
    ));
    let scheduler = Arc::new(Scheduler::new(config, upstream.clone()));
    let printer = tokio::spawn(print_events(scheduler.subscribe(), options.json));

    let started = Instant::now();
    let mut handles = Vec::with_capacity(options.count);
    for i in 0..options.count {
        let operation = OPERATIONS[i % OPERATIONS.len()];
        handles.push(scheduler.enqueue(operation, json!({ "seq": i })).await);
    }
    scheduler.start().await?;

    let outcomes = futures::future::join_all(handles).await;
    let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
    let failed = outcomes.len() - succeeded;

    scheduler.stop().await?;
    let stats = scheduler.stats().await;
    drop(scheduler);

    // Bus closes once the scheduler is gone
    printer.await?;

    Ok(SimulationReport {
        succeeded,
        failed,
        upstream_calls: upstream.call_count(),
        stats,
        elapsed: started.elapsed(),
    })
}

async fn print_events(mut rx: broadcast::Receiver<QueueEvent>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(event) if json => match serde_json::to_string(&EventLogEntry::new(event)) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::error!(error = %e, "Failed to serialize event"),
            },
            Ok(event) => println!("{}", describe(&event)),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(missed = n, "Event printer lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn describe(event: &QueueEvent) -> String {
    match event {
        QueueEvent::Enqueued {
            request_id,
            operation,
            queue_length,
        } => format!("{} {} {} (depth {})", "+".cyan(), operation, request_id.dimmed(), queue_length),
        QueueEvent::HighLoad {
            queue_length,
            threshold,
        } => format!("{} queue depth {} over {}", "!".yellow(), queue_length, threshold),
        QueueEvent::RequestCompleted {
            request_id, operation, ..
        } => format!("{} {} {}", "✓".green(), operation, request_id.dimmed()),
        QueueEvent::RequestFailed {
            request_id,
            operation,
            error,
            retry_count,
        } => format!(
            "{} {} {} after {} retries: {}",
            "✗".red(),
            operation,
            request_id.dimmed(),
            retry_count,
            error
        ),
        QueueEvent::RateLimitBackoff {
            operation,
            retry_count,
            delay_ms,
            rate_limited,
            ..
        } => format!(
            "{} {} retry {} in {}ms{}",
            "↻".yellow(),
            operation,
            retry_count + 1,
            delay_ms,
            if *rate_limited { " (rate limited)" } else { "" }
        ),
        QueueEvent::QueueCleared { cleared } => format!("{} cleared {} requests", "-".red(), cleared),
        QueueEvent::SchedulerStarted => "scheduler started".bold().to_string(),
        QueueEvent::SchedulerStopped { queue_length } => {
            format!("{} ({} left queued)", "scheduler stopped".bold(), queue_length)
        }
    }
}
