// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire format for frames exchanged over the duplex channel.
//!
//! Every WebSocket message carries exactly one JSON object. The object's
//! `type` field selects the frame kind:
//! - `connect` / `connected` / `failed`: session handshake
//! - `method`: a remote procedure call issued by the client
//! - `result` / `error`: the outcome of a method call

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum encoded frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol version offered in the handshake
pub const PROTOCOL_VERSION: &str = "1";

/// Versions this client is able to speak
pub const SUPPORTED_VERSIONS: &[&str] = &["1"];

const KNOWN_TYPES: &[&str] = &["connect", "connected", "failed", "method", "result", "error"];

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("frame has no `type` field")]
    MissingType,

    #[error("unknown frame type: {0}")]
    UnknownType(String),

    #[error("malformed `{kind}` frame: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Handshake request sent by the client right after the channel opens
    Connect {
        version: String,
        support: Vec<String>,
    },
    /// Handshake accepted; `session` is opaque and scoped to the connection
    Connected { session: String },
    /// Handshake refused; the server may name the version it would accept
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// Remote procedure call
    Method {
        method: String,
        id: String,
        #[serde(default)]
        params: Vec<Value>,
    },
    /// Successful method outcome
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        result: Value,
    },
    /// Failed method outcome; `error` is the remote payload, untouched
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        error: Value,
    },
}

impl Frame {
    /// Create the handshake request for this client's protocol version
    pub fn connect() -> Self {
        Frame::Connect {
            version: PROTOCOL_VERSION.to_string(),
            support: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Create a method call frame
    pub fn method(method: impl Into<String>, id: impl Into<String>, params: Vec<Value>) -> Self {
        Frame::Method {
            method: method.into(),
            id: id.into(),
            params,
        }
    }

    /// Create a successful reply frame
    pub fn result(id: impl Into<String>, result: Value) -> Self {
        Frame::Result {
            id: Some(id.into()),
            result,
        }
    }

    /// Create an error reply frame
    pub fn error(id: impl Into<String>, error: Value) -> Self {
        Frame::Error {
            id: Some(id.into()),
            error,
        }
    }

    /// The wire name of this frame's `type`
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Connect { .. } => "connect",
            Frame::Connected { .. } => "connected",
            Frame::Failed { .. } => "failed",
            Frame::Method { .. } => "method",
            Frame::Result { .. } => "result",
            Frame::Error { .. } => "error",
        }
    }

    /// The request id carried by method, result and error frames
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Frame::Method { id, .. } => Some(id.as_str()),
            Frame::Result { id, .. } | Frame::Error { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    /// Encode the frame as JSON text for wire transmission
    pub fn encode(&self) -> Result<String, FrameError> {
        let text = serde_json::to_string(self).map_err(FrameError::Encode)?;
        if text.len() > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(text.len()));
        }
        Ok(text)
    }

    /// Decode a frame from JSON text
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        if text.len() > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(text.len()));
        }
        let value: Value = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;
        Self::from_value(value)
    }

    /// Decode a frame from raw bytes (binary WebSocket messages)
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(bytes.len()));
        }
        let value: Value = serde_json::from_slice(bytes).map_err(FrameError::InvalidJson)?;
        Self::from_value(value)
    }

    /// Decode a frame from an already parsed JSON value
    pub fn from_value(value: Value) -> Result<Self, FrameError> {
        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(FrameError::MissingType),
        };

        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(FrameError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|source| FrameError::Malformed { kind, source })
    }
}
