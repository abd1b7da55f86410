//! Executor trait definition
//!
//! The executor is the embedding application's capability that performs the
//! actual upstream call. The scheduler only decides *when* to call it.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::ExecutorError;

/// Performs one upstream call for a queued operation
///
/// Implementations branch on `operation` and interpret `payload`; both are
/// opaque to the scheduler. Returning an error hands the failure to the
/// scheduler's retry path.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn process(&self, operation: &str, payload: &Value) -> Result<Value, ExecutorError>;
}

/// Placeholder executor that rejects every call
///
/// A scheduler built with it does no useful work; swap in a real executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnimplementedExecutor;

#[async_trait]
impl Executor for UnimplementedExecutor {
    async fn process(&self, operation: &str, _payload: &Value) -> Result<Value, ExecutorError> {
        debug!(%operation, "UnimplementedExecutor::process: called");
        Err(ExecutorError::new("process must be overridden"))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// One recorded dispatch
    #[derive(Debug, Clone)]
    pub struct Dispatch {
        pub operation: String,
        pub payload: Value,
        pub at: Instant,
    }

    /// Mock executor for unit tests
    ///
    /// Pops scripted outcomes in order; once the script is empty every call
    /// echoes its payload back.
    pub struct ScriptedExecutor {
        script: Mutex<VecDeque<Result<Value, ExecutorError>>>,
        dispatches: Mutex<Vec<Dispatch>>,
        call_count: AtomicUsize,
    }

    impl ScriptedExecutor {
        pub fn new(script: Vec<Result<Value, ExecutorError>>) -> Self {
            debug!(script_len = %script.len(), "ScriptedExecutor::new: called");
            Self {
                script: Mutex::new(script.into()),
                dispatches: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        /// Executor that always echoes
        pub fn echo() -> Self {
            Self::new(vec![])
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn dispatches(&self) -> Vec<Dispatch> {
            self.dispatches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn process(&self, operation: &str, payload: &Value) -> Result<Value, ExecutorError> {
            debug!(%operation, "ScriptedExecutor::process: called");
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.dispatches.lock().unwrap().push(Dispatch {
                operation: operation.to_string(),
                payload: payload.clone(),
                at: Instant::now(),
            });
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(payload.clone()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[tokio::test]
        async fn test_scripted_then_echo() {
            let exec = ScriptedExecutor::new(vec![Err(ExecutorError::new("first fails"))]);

            assert!(exec.process("op", &json!(1)).await.is_err());
            assert_eq!(exec.process("op", &json!(2)).await.unwrap(), json!(2));
            assert_eq!(exec.call_count(), 2);
            assert_eq!(exec.dispatches()[1].payload, json!(2));
        }
    }
}
