// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! nasctl Protocol - WebSocket + JSON frame communication layer
//!
//! This crate provides the wire protocol spoken between nasctl and the
//! storage appliance management API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    nasctl-protocol                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session: connect/connected handshake                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Frames: JSON objects tagged by `type`                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: WebSocket (tokio-tungstenite) over TCP/TLS      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! One frame is carried per WebSocket message. The request/response
//! correlation itself lives in `nasctl-client`; this crate only knows how to
//! move frames and how to open a session.
//!
//! # Usage
//!
//! ```ignore
//! use nasctl_protocol::{Connector, Endpoint, WsConnector, handshake};
//!
//! let endpoint = Endpoint::new("nas.local", 443);
//! let mut channel = WsConnector::default().open(&endpoint).await?;
//! let session = handshake::negotiate(channel.as_mut()).await?;
//! ```

pub mod frame;
pub mod handshake;
pub mod memory;
pub mod transport;

pub use frame::{Frame, FrameError, MAX_FRAME_SIZE, PROTOCOL_VERSION, SUPPORTED_VERSIONS};
pub use memory::{MemoryChannel, MemoryConnector, MemoryListener};
pub use transport::{Connector, Endpoint, FrameChannel, TransportError, WsConnector};
