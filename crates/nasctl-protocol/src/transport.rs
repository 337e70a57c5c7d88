// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Duplex transports that carry frames between nasctl and the appliance.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{Connector as WsTlsConnector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};

use crate::frame::{Frame, FrameError};

/// Errors that can occur while moving frames over a transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("connection closed")]
    Closed,

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Closed
            }
            tungstenite::Error::Io(io) => TransportError::Io(io),
            other => TransportError::WebSocket(Box::new(other)),
        }
    }
}

/// Address and security settings of a management API endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Use `wss://` instead of `ws://`
    pub use_tls: bool,
    /// Verify the server certificate (only meaningful with TLS)
    pub verify_tls: bool,
}

impl Endpoint {
    /// Path the management API serves its WebSocket on
    pub const PATH: &'static str = "/websocket";

    /// Create a TLS endpoint with certificate verification enabled
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls: true,
            verify_tls: true,
        }
    }

    /// Enable or disable TLS.
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Enable or disable certificate verification.
    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    /// WebSocket URL for this endpoint
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, self, Self::PATH)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A bidirectional, ordered channel of frames.
///
/// A channel is exclusively owned by one connection; callers must not
/// interleave `send`/`recv` pairs from different requests.
#[async_trait]
pub trait FrameChannel: Send {
    /// Send one frame
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Wait for the next frame
    async fn recv(&mut self) -> Result<Frame, TransportError>;

    /// Close the channel
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Factory that opens frame channels to an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new channel; no handshake is performed
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn FrameChannel>, TransportError>;
}

/// Opens WebSocket channels over TCP, optionally wrapped in TLS
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl WsConnector {
    /// Create a connector with the given connect timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn tls_connector(endpoint: &Endpoint) -> Result<WsTlsConnector, TransportError> {
        if !endpoint.use_tls {
            warn!(endpoint = %endpoint, "TLS is disabled - connection will be unencrypted");
            return Ok(WsTlsConnector::Plain);
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder =
            rustls::ClientConfig::builder_with_provider(provider).with_safe_default_protocol_versions()?;

        let crypto = if endpoint.verify_tls {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        } else {
            warn!(endpoint = %endpoint, "TLS certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
                .with_no_client_auth()
        };

        Ok(WsTlsConnector::Rustls(Arc::new(crypto)))
    }
}

#[async_trait]
impl Connector for WsConnector {
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn FrameChannel>, TransportError> {
        let url = endpoint.url();
        let tls = Self::tls_connector(endpoint)?;

        debug!(%url, "opening websocket");
        let connecting =
            tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, true, Some(tls));

        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout.as_millis() as u64))??;

        info!(%url, "websocket connected");
        Ok(Box::new(WsChannel { stream }))
    }
}

/// Frame channel backed by a WebSocket stream
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameChannel for WsChannel {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let text = frame.encode()?;
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Frame, TransportError> {
        loop {
            let message = match self.stream.next().await {
                Some(message) => message?,
                None => return Err(TransportError::Closed),
            };

            match message {
                Message::Text(text) => return Ok(Frame::decode(text.as_str())?),
                Message::Binary(data) => return Ok(Frame::decode_bytes(&data)?),
                Message::Close(close) => {
                    debug!(?close, "peer closed websocket");
                    return Err(TransportError::Closed);
                }
                // Control frames are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Certificate verifier that accepts every certificate (self-signed appliances)
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
