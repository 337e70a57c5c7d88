// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for nasctl-batch.

use std::path::PathBuf;

use thiserror::Error;

/// Result type using BatchError.
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors raised before any operation runs.
///
/// Failures of individual operations never surface here; they become failed
/// [`BatchResult`](crate::BatchResult)s.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Incompatible or out-of-range options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The batch document is structurally invalid.
    #[error("invalid batch document: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("unsupported batch file format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON-lines record could not be turned into an operation.
    #[error("invalid operation at line {line}: {reason}")]
    Line { line: usize, reason: String },
}

/// Failure reported by an [`OperationExecutor`](crate::OperationExecutor).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExecutorError {
    message: String,
}

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Wrap any displayable error.
    pub fn from_display(err: impl std::fmt::Display) -> Self {
        Self::new(err.to_string())
    }
}

impl From<String> for ExecutorError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ExecutorError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
