// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batch execution engine.
//!
//! Sequential mode runs operations in list order and may stop at the first
//! failure. Parallel mode spawns every operation up front, bounds how many run
//! at once with a semaphore, and reports results in completion order. Spawned
//! operations cannot be recalled, which is why `stop_on_error` is refused in
//! parallel mode.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::error::{BatchError, ExecutorError, Result};
use crate::operation::Operation;

pub const DEFAULT_MAX_WORKERS: usize = 4;

/// How a batch is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub parallel: bool,
    pub max_workers: usize,
    pub stop_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            max_workers: DEFAULT_MAX_WORKERS,
            stop_on_error: false,
        }
    }
}

impl BatchOptions {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn parallel(max_workers: usize) -> Self {
        Self {
            parallel: true,
            max_workers,
            stop_on_error: false,
        }
    }

    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }
}

/// Outcome of one operation. Produced exactly once per executed operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub operation: Operation,
    pub success: bool,
    pub value: Option<Value>,
    pub error: Option<String>,
}

impl BatchResult {
    pub fn succeeded(operation: Operation, value: Value) -> Self {
        Self {
            operation,
            success: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn failed(operation: Operation, error: impl Into<String>) -> Self {
        Self {
            operation,
            success: false,
            value: None,
            error: Some(error.into()),
        }
    }

    fn from_join(
        operation: Operation,
        joined: std::result::Result<std::result::Result<Value, ExecutorError>, JoinError>,
    ) -> Self {
        match joined {
            Ok(Ok(value)) => Self::succeeded(operation, value),
            Ok(Err(e)) => Self::failed(operation, e.message()),
            Err(e) if e.is_panic() => Self::failed(operation, "executor panicked"),
            Err(_) => Self::failed(operation, "operation was cancelled"),
        }
    }
}

/// Performs the effect an operation describes.
///
/// Implemented for any `Fn(Operation) -> impl Future<Output = Result<Value, ExecutorError>>`.
/// Executors shared across parallel workers synchronize their own state.
#[async_trait]
pub trait OperationExecutor: Send + Sync + 'static {
    async fn execute(&self, operation: Operation) -> std::result::Result<Value, ExecutorError>;
}

#[async_trait]
impl<F, Fut> OperationExecutor for F
where
    F: Fn(Operation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, ExecutorError>> + Send + 'static,
{
    async fn execute(&self, operation: Operation) -> std::result::Result<Value, ExecutorError> {
        (self)(operation).await
    }
}

/// Runs a list of operations against an executor.
#[derive(Debug, Clone)]
pub struct BatchEngine {
    options: BatchOptions,
}

impl BatchEngine {
    /// Validate `options`. Fails before anything runs when parallel mode is
    /// combined with `stop_on_error` or no workers are allowed.
    pub fn new(options: BatchOptions) -> Result<Self> {
        if options.parallel && options.stop_on_error {
            return Err(BatchError::Configuration(
                "--stop-on-error cannot be used with --parallel: in parallel mode all \
                 operations are submitted at once and cannot be cancelled mid-execution"
                    .to_string(),
            ));
        }
        if options.max_workers == 0 {
            return Err(BatchError::Configuration(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run `operations`.
    ///
    /// Without `stop_on_error` the result list has one entry per operation;
    /// with it the list ends at the first failure.
    pub async fn execute<E>(&self, operations: Vec<Operation>, executor: Arc<E>) -> Vec<BatchResult>
    where
        E: OperationExecutor + ?Sized,
    {
        let total = operations.len();
        info!(
            total,
            parallel = self.options.parallel,
            max_workers = self.options.max_workers,
            stop_on_error = self.options.stop_on_error,
            "starting batch"
        );

        let results = if self.options.parallel {
            self.run_parallel(operations, executor).await
        } else {
            self.run_sequential(operations, executor).await
        };

        let failed = results.iter().filter(|r| !r.success).count();
        info!(total, executed = results.len(), failed, "batch finished");
        results
    }

    async fn run_sequential<E>(&self, operations: Vec<Operation>, executor: Arc<E>) -> Vec<BatchResult>
    where
        E: OperationExecutor + ?Sized,
    {
        let total = operations.len();
        let mut results = Vec::with_capacity(total);

        for operation in operations {
            let handle = spawn_operation(operation.clone(), executor.clone(), None);
            let result = BatchResult::from_join(operation, handle.await);
            report(&result, results.len() + 1, total);

            let stop = !result.success && self.options.stop_on_error;
            results.push(result);
            if stop {
                warn!(
                    remaining = total - results.len(),
                    "stopping batch after failed operation"
                );
                break;
            }
        }

        results
    }

    async fn run_parallel<E>(&self, operations: Vec<Operation>, executor: Arc<E>) -> Vec<BatchResult>
    where
        E: OperationExecutor + ?Sized,
    {
        let total = operations.len();
        let semaphore = Arc::new(Semaphore::new(self.options.max_workers));

        let mut in_flight: FuturesUnordered<_> = operations
            .into_iter()
            .map(|operation| {
                let handle =
                    spawn_operation(operation.clone(), executor.clone(), Some(semaphore.clone()));
                async move { BatchResult::from_join(operation, handle.await) }
            })
            .collect();

        let mut results = Vec::with_capacity(total);
        while let Some(result) = in_flight.next().await {
            report(&result, results.len() + 1, total);
            results.push(result);
        }
        results
    }
}

fn spawn_operation<E>(
    operation: Operation,
    executor: Arc<E>,
    permits: Option<Arc<Semaphore>>,
) -> tokio::task::JoinHandle<std::result::Result<Value, ExecutorError>>
where
    E: OperationExecutor + ?Sized,
{
    tokio::spawn(async move {
        let _permit = match permits {
            Some(semaphore) => Some(
                semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| ExecutorError::new("worker pool closed"))?,
            ),
            None => None,
        };
        debug!(id = %operation.id, command = %operation.command, "running operation");
        executor.execute(operation).await
    })
}

fn report(result: &BatchResult, done: usize, total: usize) {
    let id = &result.operation.id;
    match &result.error {
        None => info!(%id, done, total, "operation succeeded"),
        Some(error) => warn!(%id, done, total, %error, "operation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parallel_with_stop_on_error_is_rejected() {
        let err = BatchEngine::new(BatchOptions::parallel(4).with_stop_on_error(true)).unwrap_err();
        assert!(matches!(err, BatchError::Configuration(ref m) if m.contains("--parallel")));
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        assert!(matches!(
            BatchEngine::new(BatchOptions::parallel(0)),
            Err(BatchError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_options() {
        let options = BatchOptions::default();
        assert!(!options.parallel);
        assert_eq!(options.max_workers, 4);
        assert!(!options.stop_on_error);
        assert!(BatchEngine::new(options.with_stop_on_error(true)).is_ok());
    }

    #[tokio::test]
    async fn test_panicking_executor_fails_only_its_operation() {
        let engine = BatchEngine::new(BatchOptions::sequential()).unwrap();
        let executor = Arc::new(|op: Operation| async move {
            if op.id == "boom" {
                panic!("executor bug");
            }
            Ok::<_, ExecutorError>(json!(op.id))
        });

        let results = engine
            .execute(
                vec![
                    Operation::new("a", "x"),
                    Operation::new("boom", "x"),
                    Operation::new("c", "x"),
                ],
                executor,
            )
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert_eq!(results[1].error.as_deref(), Some("executor panicked"));
        assert!(results[2].success);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let engine = BatchEngine::new(BatchOptions::parallel(2)).unwrap();
        let executor = Arc::new(|_op: Operation| async { Ok::<_, ExecutorError>(Value::Null) });
        assert!(engine.execute(Vec::new(), executor).await.is_empty());
    }
}
