// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Aggregate report over a finished batch.

use std::fmt;

use crate::engine::BatchResult;

/// Counts and failures of a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `(operation id, error message)` in result order.
    pub failures: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn from_results(results: &[BatchResult]) -> Self {
        let failures: Vec<(String, String)> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                (
                    r.operation.id.clone(),
                    r.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                )
            })
            .collect();

        Self {
            total: results.len(),
            succeeded: results.len() - failures.len(),
            failed: failures.len(),
            failures,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch Execution Summary")?;
        writeln!(f, "  Total operations: {}", self.total)?;
        writeln!(f, "  Successful:       {}", self.succeeded)?;
        write!(f, "  Failed:           {}", self.failed)?;
        if !self.failures.is_empty() {
            write!(f, "\n\nErrors:")?;
            for (id, error) in &self.failures {
                write!(f, "\n  - {}: {}", id, error)?;
            }
        }
        Ok(())
    }
}
