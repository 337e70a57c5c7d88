// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! NasClient: connection lifecycle and request/response correlation.

use std::sync::Arc;
use std::time::Duration;

use nasctl_protocol::{Connector, Endpoint, Frame, FrameChannel, TransportError, WsConnector, handshake};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::auth::AuthState;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::redact;

/// An open channel plus everything scoped to its lifetime.
pub(crate) struct Session {
    channel: Box<dyn FrameChannel>,
    pub(crate) id: String,
    next_request: u64,
    pub(crate) auth: AuthState,
}

impl Session {
    fn next_request_id(&mut self) -> String {
        self.next_request += 1;
        format!("req_{}", self.next_request)
    }
}

/// Client for the appliance management API.
///
/// At most one request is in flight per client: the session lock is held
/// from sending a request until its reply has been read, so concurrent
/// callers are served one after another.
pub struct NasClient {
    config: ClientConfig,
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    pub(crate) session: Mutex<Option<Session>>,
    /// Serializes login flows so `ensure_authenticated` logs in once.
    pub(crate) login_lock: Mutex<()>,
    span: Span,
}

impl NasClient {
    /// Create a client that dials the appliance over WebSocket.
    pub fn new(config: ClientConfig) -> Self {
        let connector = Arc::new(WsConnector::new(config.connect_timeout));
        Self::with_connector(config, connector)
    }

    /// Create a client with a custom connection factory.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let endpoint = config.endpoint();
        let span = info_span!("nas_client", endpoint = %endpoint);
        Self {
            config,
            endpoint,
            connector,
            session: Mutex::new(None),
            login_lock: Mutex::new(()),
            span,
        }
    }

    /// Create a client from `NASCTL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ClientConfig::from_env()?))
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The endpoint this client talks to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Open the channel and complete the handshake. No-op when connected.
    pub async fn connect(&self) -> Result<()> {
        self.connect_inner().instrument(self.span.clone()).await
    }

    async fn connect_inner(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            debug!("reusing existing session");
            return Ok(());
        }

        info!("connecting");
        let connect_timeout = self.config.connect_timeout;
        let opened = tokio::time::timeout(connect_timeout, async {
            let mut channel = self.connector.open(&self.endpoint).await?;
            match handshake::negotiate(channel.as_mut()).await {
                Ok(session) => Ok((channel, session)),
                Err(e) => {
                    let _ = channel.close().await;
                    Err(e)
                }
            }
        })
        .await
        .unwrap_or(Err(TransportError::Timeout(millis(connect_timeout))));

        let (channel, session_id) = opened.map_err(|e| match e {
            TransportError::Timeout(after_ms) => ClientError::Timeout {
                operation: format!("connect to {}", self.endpoint),
                after_ms,
            },
            other => ClientError::connection(&self.endpoint, other),
        })?;

        info!(session = %session_id, "connected");
        *guard = Some(Session {
            channel,
            id: session_id,
            next_request: 0,
            auth: AuthState::Unauthenticated,
        });
        Ok(())
    }

    /// Close the channel and forget session and authentication state.
    ///
    /// Safe to call when not connected. Close failures are logged, not returned.
    pub async fn disconnect(&self) {
        let span = self.span.clone();
        async {
            let taken = self.session.lock().await.take();
            if let Some(mut session) = taken {
                match session.channel.close().await {
                    Ok(()) | Err(TransportError::Closed) => {}
                    Err(e) => warn!(error = %e, "error while closing connection"),
                }
                info!(session = %session.id, "disconnected");
            }
        }
        .instrument(span)
        .await
    }

    /// Whether a session is currently open.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Identifier returned by the handshake, if connected.
    pub async fn session_id(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|s| s.id.clone())
    }

    /// Invoke a remote method and return its result payload.
    ///
    /// Requires an open connection. An `error` reply becomes
    /// [`ClientError::Api`] with the server payload unchanged. Never retries.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let logged = redact::sanitize_params(&params);
        self.exchange(method, params, logged)
            .instrument(self.span.clone())
            .await
    }

    /// [`call`](Self::call) with the result deserialized into `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let value = self.call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Query a resource collection (`<resource>.query`).
    ///
    /// `filters` follows the server's `[field, operator, value]` triples;
    /// `options` (limit, offset, order_by, ...) is only sent when given.
    pub async fn query(
        &self,
        resource: &str,
        filters: Vec<Value>,
        options: Option<Value>,
    ) -> Result<Value> {
        let mut params = vec![Value::Array(filters)];
        if let Some(options) = options {
            params.push(options);
        }
        self.call(&format!("{}.query", resource), params).await
    }

    /// System information (`system.info`).
    pub async fn system_info(&self) -> Result<Value> {
        self.call("system.info", Vec::new()).await
    }

    /// Send one request and read one reply. `logged` is what gets written to
    /// the log in place of `params`.
    pub(crate) async fn exchange(
        &self,
        method: &str,
        params: Vec<Value>,
        logged: Value,
    ) -> Result<Value> {
        if method.trim().is_empty() {
            return Err(ClientError::Validation("method name must not be empty".into()));
        }

        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return Err(ClientError::connection(&self.endpoint, "not connected"));
        };

        let request_id = session.next_request_id();
        debug!(id = %request_id, method, params = %logged, "sending request");

        let request = Frame::method(method, request_id.clone(), params);
        let request_timeout = self.config.request_timeout;
        let reply = tokio::time::timeout(request_timeout, async {
            session.channel.send(&request).await?;
            session.channel.recv().await
        })
        .await;

        let frame = match reply {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                self.drop_session(&mut guard, "transport failure").await;
                return Err(ClientError::from_transport(&self.endpoint, method, e));
            }
            Err(_) => {
                self.drop_session(&mut guard, "request timed out").await;
                return Err(ClientError::Timeout {
                    operation: method.to_string(),
                    after_ms: millis(request_timeout),
                });
            }
        };

        if let Some(reply_id) = frame.request_id() {
            if reply_id != request_id {
                let reply_id = reply_id.to_string();
                self.drop_session(&mut guard, "reply id mismatch").await;
                return Err(ClientError::Protocol(format!(
                    "reply id '{}' does not match request id '{}'",
                    reply_id, request_id
                )));
            }
        }

        match frame {
            Frame::Result { result, .. } => {
                debug!(id = %request_id, "request succeeded");
                Ok(result)
            }
            Frame::Error { error, .. } => {
                debug!(id = %request_id, error = %redact::sanitize(&error), "request failed");
                Err(ClientError::Api {
                    method: method.to_string(),
                    payload: error,
                })
            }
            other => {
                let kind = other.kind();
                self.drop_session(&mut guard, "unexpected frame").await;
                Err(ClientError::Protocol(format!(
                    "expected `result` or `error` frame, got `{}`",
                    kind
                )))
            }
        }
    }

    /// Forget the session so a late reply can never answer a later request.
    async fn drop_session(&self, guard: &mut Option<Session>, reason: &str) {
        if let Some(mut session) = guard.take() {
            warn!(session = %session.id, reason, "dropping connection");
            let _ = session.channel.close().await;
        }
    }
}

impl std::fmt::Debug for NasClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NasClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
