// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for nasctl-client.

use std::fmt;

use nasctl_protocol::TransportError;
use serde_json::Value;
use thiserror::Error;

/// Result type using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the management API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport or handshake failure, or no open connection.
    #[error("connection error ({endpoint}): {reason}")]
    Connection { endpoint: String, reason: String },

    /// No reply within the configured bound.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// Credentials rejected by the server.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The remote method returned an error; `payload` is exactly what the server sent.
    #[error("API error from {method}: {payload}")]
    Api { method: String, payload: Value },

    /// Malformed local arguments caught before dispatch.
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller misuse or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The server sent something the protocol does not allow here.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The operation was cancelled while waiting.
    #[error("operation cancelled")]
    Cancelled,
}

/// Classification of a [`ClientError`], used by the retry wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Timeout,
    Authentication,
    Api,
    Validation,
    Configuration,
    Protocol,
    Cancelled,
}

impl ErrorKind {
    /// Only connection and timeout failures are transient by default.
    pub fn is_retryable_by_default(self) -> bool {
        matches!(self, ErrorKind::Connection | ErrorKind::Timeout)
    }

    /// Stable lowercase name, used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Api => "api",
            ErrorKind::Validation => "validation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClientError {
    /// Build a connection error for `endpoint`.
    pub fn connection(endpoint: impl fmt::Display, reason: impl fmt::Display) -> Self {
        ClientError::Connection {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Map a transport failure on `endpoint` into the taxonomy.
    pub fn from_transport(endpoint: impl fmt::Display, operation: &str, err: TransportError) -> Self {
        match err {
            TransportError::Timeout(after_ms) => ClientError::Timeout {
                operation: operation.to_string(),
                after_ms,
            },
            TransportError::Frame(frame_err) => ClientError::Protocol(frame_err.to_string()),
            other => ClientError::connection(endpoint, other),
        }
    }

    /// Pure classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Connection { .. } => ErrorKind::Connection,
            ClientError::Timeout { .. } => ErrorKind::Timeout,
            ClientError::Authentication(_) => ErrorKind::Authentication,
            ClientError::Api { .. } => ErrorKind::Api,
            ClientError::Validation(_) => ErrorKind::Validation,
            ClientError::Configuration(_) => ErrorKind::Configuration,
            ClientError::Protocol(_) => ErrorKind::Protocol,
            ClientError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Process exit code used by the command-line front end.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Authentication => 2,
            ErrorKind::Configuration => 3,
            _ => 1,
        }
    }

    /// The remote error payload, if this is an API error.
    pub fn api_payload(&self) -> Option<&Value> {
        match self {
            ClientError::Api { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Protocol(format!("unexpected result shape: {}", err))
    }
}

impl From<crate::retry::Cancelled> for ClientError {
    fn from(_: crate::retry::Cancelled) -> Self {
        ClientError::Cancelled
    }
}
