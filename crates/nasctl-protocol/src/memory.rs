// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process transport.
//!
//! [`MemoryConnector`] hands the far end of every channel it opens to a
//! [`MemoryListener`], which plays the role of the appliance. Used to embed a
//! fake management API in tests without sockets.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::frame::Frame;
use crate::transport::{Connector, Endpoint, FrameChannel, TransportError};

/// One end of an in-memory frame channel
#[derive(Debug)]
pub struct MemoryChannel {
    tx: Option<mpsc::UnboundedSender<Frame>>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

/// Create two connected channel ends
pub fn channel_pair() -> (MemoryChannel, MemoryChannel) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        MemoryChannel {
            tx: Some(a_tx),
            rx: b_rx,
        },
        MemoryChannel {
            tx: Some(b_tx),
            rx: a_rx,
        },
    )
}

#[async_trait]
impl FrameChannel for MemoryChannel {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame.clone()).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<Frame, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}

/// Connector whose channels terminate at a [`MemoryListener`]
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<(Endpoint, MemoryChannel)>,
}

/// Accepts the server ends of channels opened through a [`MemoryConnector`]
#[derive(Debug)]
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<(Endpoint, MemoryChannel)>,
}

impl MemoryConnector {
    /// Create a connector and its listener
    pub fn pair() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { incoming: tx }, MemoryListener { incoming: rx })
    }
}

impl MemoryListener {
    /// Wait for the next connection; `None` once every connector is dropped
    pub async fn accept(&mut self) -> Option<(Endpoint, MemoryChannel)> {
        self.incoming.recv().await
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn FrameChannel>, TransportError> {
        let (client, server) = channel_pair();
        self.incoming.send((endpoint.clone(), server)).map_err(|_| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("nothing is listening on {}", endpoint),
            ))
        })?;
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_round_trip() {
        let (mut a, mut b) = channel_pair();
        a.send(&Frame::method("system.info", "req_1", vec![]))
            .await
            .unwrap();
        let received = b.recv().await.unwrap();
        assert_eq!(received.request_id(), Some("req_1"));

        b.send(&Frame::result("req_1", json!({"hostname": "nas"})))
            .await
            .unwrap();
        assert_eq!(
            a.recv().await.unwrap(),
            Frame::result("req_1", json!({"hostname": "nas"}))
        );
    }

    #[tokio::test]
    async fn test_close_is_seen_by_peer() {
        let (mut a, mut b) = channel_pair();
        a.close().await.unwrap();
        assert!(matches!(b.recv().await, Err(TransportError::Closed)));
        assert!(matches!(
            a.send(&Frame::connect()).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_connector_without_listener_is_refused() {
        let (connector, listener) = MemoryConnector::pair();
        drop(listener);
        let result = connector.open(&Endpoint::new("nas", 443)).await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_listener_receives_endpoint() {
        let (connector, mut listener) = MemoryConnector::pair();
        let _client = connector.open(&Endpoint::new("nas", 8443)).await.unwrap();
        let (endpoint, _server) = listener.accept().await.unwrap();
        assert_eq!(endpoint.port, 8443);
    }
}
