// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded retry with exponential backoff.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ClientError, ErrorKind, Result};

/// Classification hook consumed by the retry loop.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for ClientError {
    fn kind(&self) -> ErrorKind {
        ClientError::kind(self)
    }
}

/// Marker for a retry loop cancelled while backing off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("retry cancelled")
    }
}

/// Retry parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Sleep before the second attempt.
    pub initial_delay: Duration,
    /// Factor applied to the delay after every retry.
    pub backoff_multiplier: f64,
    /// Error kinds worth another attempt.
    pub retryable: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            retryable: vec![ErrorKind::Connection, ErrorKind::Timeout],
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// Reject policies the loop cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ClientError::Configuration(
                "max_attempts must be at least 1".into(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ClientError::Configuration(format!(
                "backoff_multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Sleeps between consecutive attempts, in order.
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut delay = self.initial_delay;
        for _ in 1..self.max_attempts {
            delays.push(delay);
            delay = self.grow(delay);
        }
        delays
    }

    fn grow(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_multiplier)
            .unwrap_or(Duration::MAX)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent. The error of the last attempt is returned.
///
/// A policy with `max_attempts == 0` behaves like a single attempt.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, operation: F) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Classify + fmt::Display,
{
    run(policy, operation, std::future::pending()).await
}

/// [`with_retry`] whose backoff sleeps end early when `token` is cancelled.
///
/// Cancellation is only observed between attempts; the error returned is
/// `E::from(Cancelled)`, never the error of the interrupted loop.
pub async fn with_retry_cancellable<T, E, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Classify + fmt::Display + From<Cancelled>,
{
    run(policy, operation, async {
        token.cancelled().await;
        E::from(Cancelled)
    })
    .await
}

async fn run<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    mut operation: F,
    cancelled: C,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Classify + fmt::Display,
    C: Future<Output = E>,
{
    tokio::pin!(cancelled);
    let mut attempt: u32 = 1;
    let mut delay = policy.initial_delay;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let kind = error.kind();
        if !policy.is_retryable(kind) {
            debug!(attempt, %kind, "error is not retryable");
            return Err(error);
        }
        if attempt >= policy.max_attempts {
            warn!(attempt, %kind, error = %error, "giving up after final attempt");
            return Err(error);
        }

        warn!(
            attempt,
            max_attempts = policy.max_attempts,
            %kind,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            cancel = &mut cancelled => {
                debug!(attempt, "retry cancelled during backoff");
                return Err(cancel);
            }
        }

        delay = policy.grow(delay);
        attempt += 1;
    }
}
