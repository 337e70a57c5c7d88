// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! nasctl Client - SDK for storage appliance management APIs
//!
//! This crate provides the RPC client used by the `nasctl` command-line tool:
//! connection lifecycle, request/response correlation, authentication and a
//! retry wrapper for transient failures.
//!
//! # Example
//!
//! ```ignore
//! use nasctl_client::{ClientConfig, Credentials, NasClient, RetryPolicy, with_retry};
//!
//! #[tokio::main]
//! async fn main() -> nasctl_client::Result<()> {
//!     let client = NasClient::new(ClientConfig::new().with_host("nas.local"));
//!     let creds = Credentials::api_key("1-abcdef");
//!
//!     // Each attempt reconnects and logs in again if the last one dropped the connection
//!     let pools = with_retry(&RetryPolicy::default(), || {
//!         client.authenticated_call(&creds, "pool.query", vec![])
//!     })
//!     .await?;
//!     println!("{}", pools);
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! [`ClientConfig::from_env`] reads the `NASCTL_*` variables; credentials are
//! resolved separately through a [`CredentialResolver`].

pub mod auth;
mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod redact;
pub mod retry;

pub use auth::AuthState;
pub use client::NasClient;
pub use config::ClientConfig;
pub use credentials::{CredentialResolver, Credentials, EnvCredentials};
pub use error::{ClientError, ErrorKind, Result};
pub use retry::{Cancelled, Classify, RetryPolicy, with_retry, with_retry_cancellable};

// Re-export the wire layer for callers that inject their own connector
pub use nasctl_protocol::{Connector, Endpoint, FrameChannel};
