// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the client.

use std::time::Duration;

use nasctl_protocol::Endpoint;

use crate::error::{ClientError, Result};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 443;

/// Connection settings for a [`NasClient`](crate::NasClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Appliance hostname or IP address.
    pub host: String,
    /// Appliance port.
    pub port: u16,
    /// Use `wss://` instead of `ws://`.
    pub use_tls: bool,
    /// Accept any server certificate (self-signed appliances).
    pub skip_cert_verification: bool,
    /// Bound on opening the transport and completing the handshake.
    pub connect_timeout: Duration,
    /// Bound on waiting for a single reply.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            use_tls: true,
            skip_cert_verification: false,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for an appliance on this machine.
    ///
    /// Certificate verification is skipped; local appliances ship self-signed
    /// certificates.
    pub fn localhost() -> Self {
        Self {
            skip_cert_verification: true,
            ..Self::default()
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `NASCTL_HOST`: appliance host (default: "localhost")
    /// - `NASCTL_PORT`: appliance port (default: 443)
    /// - `NASCTL_USE_TLS`: use TLS (default: "true")
    /// - `NASCTL_SKIP_CERT_VERIFICATION`: skip TLS verification (default: "false")
    /// - `NASCTL_CONNECT_TIMEOUT_MS`: connect timeout in milliseconds (default: 10000)
    /// - `NASCTL_REQUEST_TIMEOUT_MS`: request timeout in milliseconds (default: 30000)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let host = lookup("NASCTL_HOST")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(defaults.host);

        let port = match lookup("NASCTL_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ClientError::Configuration(format!("invalid NASCTL_PORT: {}", e)))?,
            None => defaults.port,
        };

        let use_tls = match lookup("NASCTL_USE_TLS") {
            Some(raw) => parse_bool("NASCTL_USE_TLS", &raw)?,
            None => defaults.use_tls,
        };

        let skip_cert_verification = match lookup("NASCTL_SKIP_CERT_VERIFICATION") {
            Some(raw) => parse_bool("NASCTL_SKIP_CERT_VERIFICATION", &raw)?,
            None => defaults.skip_cert_verification,
        };

        let connect_timeout = match lookup("NASCTL_CONNECT_TIMEOUT_MS") {
            Some(raw) => parse_millis("NASCTL_CONNECT_TIMEOUT_MS", &raw)?,
            None => defaults.connect_timeout,
        };

        let request_timeout = match lookup("NASCTL_REQUEST_TIMEOUT_MS") {
            Some(raw) => parse_millis("NASCTL_REQUEST_TIMEOUT_MS", &raw)?,
            None => defaults.request_timeout,
        };

        Ok(Self {
            host,
            port,
            use_tls,
            skip_cert_verification,
            connect_timeout,
            request_timeout,
        })
    }

    /// Set the appliance host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the appliance port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable TLS.
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Enable or disable certificate verification skipping.
    pub fn with_skip_cert_verification(mut self, skip: bool) -> Self {
        self.skip_cert_verification = skip;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Endpoint the transport should dial.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
            .with_tls(self.use_tls)
            .with_verify_tls(!self.skip_cert_verification)
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ClientError::Configuration(format!(
            "invalid {}: expected a boolean, got '{}'",
            name, other
        ))),
    }
}

fn parse_millis(name: &str, raw: &str) -> Result<Duration> {
    let ms: u64 = raw
        .trim()
        .parse()
        .map_err(|e| ClientError::Configuration(format!("invalid {}: {}", name, e)))?;
    if ms == 0 {
        return Err(ClientError::Configuration(format!(
            "invalid {}: must be greater than zero",
            name
        )));
    }
    Ok(Duration::from_millis(ms))
}
