// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session handshake performed once per freshly opened channel.

use tracing::{debug, instrument};

use crate::frame::{Frame, PROTOCOL_VERSION};
use crate::transport::{FrameChannel, TransportError};

/// Negotiate the protocol version and obtain the session identifier.
///
/// Sends `connect` and expects exactly one `connected` frame back. A `failed`
/// frame, any other frame, or a transport failure aborts the handshake.
#[instrument(skip(channel))]
pub async fn negotiate(channel: &mut dyn FrameChannel) -> Result<String, TransportError> {
    channel.send(&Frame::connect()).await?;

    match channel.recv().await? {
        Frame::Connected { session } => {
            debug!(%session, "session established");
            Ok(session)
        }
        Frame::Failed { version } => Err(TransportError::Handshake(match version {
            Some(v) => format!(
                "server rejected protocol version {} (server speaks {})",
                PROTOCOL_VERSION, v
            ),
            None => format!("server rejected protocol version {}", PROTOCOL_VERSION),
        })),
        other => Err(TransportError::Handshake(format!(
            "expected `connected` frame, got `{}`",
            other.kind()
        ))),
    }
}
