// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batch engine behavior tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nasctl_batch::{BatchEngine, BatchError, BatchOptions, ExecutorError, Operation, OperationExecutor};
use serde_json::{Value, json};

/// Records which operations ran; fails any operation whose command is "fail".
#[derive(Default)]
struct Recorder {
    executed: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl OperationExecutor for Recorder {
    async fn execute(&self, operation: Operation) -> Result<Value, ExecutorError> {
        self.executed.lock().unwrap().push(operation.id.clone());
        if operation.command == "fail" {
            Err(ExecutorError::new(format!("{} failed", operation.id)))
        } else {
            Ok(json!({"done": operation.id}))
        }
    }
}

fn abc() -> Vec<Operation> {
    vec![
        Operation::new("A", "ok"),
        Operation::new("B", "fail"),
        Operation::new("C", "ok"),
    ]
}

#[tokio::test]
async fn test_sequential_stop_on_error_returns_prefix() {
    let engine = BatchEngine::new(BatchOptions::sequential().with_stop_on_error(true)).unwrap();
    let recorder = Arc::new(Recorder::default());

    let results = engine.execute(abc(), recorder.clone()).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].operation.id, "A");
    assert!(results[0].success);
    assert_eq!(results[0].value, Some(json!({"done": "A"})));
    assert_eq!(results[1].operation.id, "B");
    assert!(!results[1].success);
    assert_eq!(results[1].error.as_deref(), Some("B failed"));
    assert_eq!(*recorder.executed.lock().unwrap(), vec!["A", "B"]);
}

#[tokio::test]
async fn test_sequential_without_stop_runs_everything_in_order() {
    let engine = BatchEngine::new(BatchOptions::sequential()).unwrap();
    let recorder = Arc::new(Recorder::default());

    let results = engine.execute(abc(), recorder.clone()).await;

    let outcome: Vec<(&str, bool)> = results
        .iter()
        .map(|r| (r.operation.id.as_str(), r.success))
        .collect();
    assert_eq!(outcome, vec![("A", true), ("B", false), ("C", true)]);
    assert_eq!(*recorder.executed.lock().unwrap(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_parallel_with_stop_on_error_rejected_before_running() {
    let result = BatchEngine::new(BatchOptions::parallel(4).with_stop_on_error(true));
    assert!(matches!(result, Err(BatchError::Configuration(_))));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_runs_each_operation_once_within_worker_bound() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let executor = {
        let running = running.clone();
        let peak = peak.clone();
        Arc::new(move |op: Operation| {
            let running = running.clone();
            let peak = peak.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                if op.id == "op3" {
                    Err(ExecutorError::new("boom"))
                } else {
                    Ok(json!(op.id))
                }
            }
        })
    };

    let engine = BatchEngine::new(BatchOptions::parallel(2)).unwrap();
    let ops: Vec<Operation> = (0..5).map(|i| Operation::new(format!("op{}", i), "x")).collect();
    let results = engine.execute(ops, executor).await;

    assert_eq!(results.len(), 5);
    let ids: HashSet<&str> = results.iter().map(|r| r.operation.id.as_str()).collect();
    assert_eq!(ids.len(), 5);
    assert_eq!(results.iter().filter(|r| !r.success).count(), 1);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(running.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_results_arrive_in_completion_order() {
    let executor = Arc::new(|op: Operation| async move {
        let delay = op.args["delay_ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok::<_, ExecutorError>(Value::Null)
    });

    let ops = vec![
        Operation::new("slow", "x").with_arg("delay_ms", 30),
        Operation::new("medium", "x").with_arg("delay_ms", 20),
        Operation::new("fast", "x").with_arg("delay_ms", 10),
    ];

    let engine = BatchEngine::new(BatchOptions::parallel(3)).unwrap();
    let results = engine.execute(ops, executor).await;

    let order: Vec<&str> = results.iter().map(|r| r.operation.id.as_str()).collect();
    assert_eq!(order, vec!["fast", "medium", "slow"]);
}

#[tokio::test]
async fn test_parallel_failure_does_not_abort_siblings() {
    let engine = BatchEngine::new(BatchOptions::parallel(2)).unwrap();
    let recorder = Arc::new(Recorder::default());

    let results = engine.execute(abc(), recorder.clone()).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|r| r.success).count(), 2);
    assert_eq!(recorder.executed.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_trait_object_executor() {
    let engine = BatchEngine::new(BatchOptions::sequential()).unwrap();
    let executor: Arc<dyn OperationExecutor> = Arc::new(Recorder::default());

    let results = engine.execute(abc(), executor).await;
    assert_eq!(results.len(), 3);
}
