// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! nasctl Batch - run many operations in one go
//!
//! The engine knows nothing about the management API: it takes a list of
//! [`Operation`]s and an [`OperationExecutor`] and returns one [`BatchResult`]
//! per executed operation.
//!
//! ```ignore
//! use std::sync::Arc;
//! use nasctl_batch::{BatchEngine, BatchOptions, BatchSummary, Operation};
//!
//! let engine = BatchEngine::new(BatchOptions::parallel(8))?;
//! let ops = nasctl_batch::load_file("ops.yaml".as_ref())?;
//! let results = engine
//!     .execute(ops, Arc::new(|op: Operation| async move { run(op).await }))
//!     .await;
//! println!("{}", BatchSummary::from_results(&results));
//! ```

pub mod engine;
pub mod error;
pub mod operation;
pub mod summary;

pub use engine::{BatchEngine, BatchOptions, BatchResult, DEFAULT_MAX_WORKERS, OperationExecutor};
pub use error::{BatchError, ExecutorError, Result};
pub use operation::{
    BatchFormat, Operation, load_file, operations_from_value, parse_document, parse_json_lines,
    read_document, render_sample, sample_document, validate_document,
};
pub use summary::BatchSummary;
