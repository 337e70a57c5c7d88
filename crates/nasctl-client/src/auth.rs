// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authentication state machine.
//!
//! ```text
//! Unauthenticated ──login──▶ Authenticating ──ok──▶ Authenticated
//!        ▲                         │
//!        └─────── rejected ────────┘
//! ```
//!
//! State lives inside the session, so dropping the connection also drops
//! authentication. A login outcome is only recorded on the session the login
//! was started on; if the connection is replaced meanwhile, the new session
//! stays `Unauthenticated`.

use serde_json::{Value, json};
use tracing::{Instrument, info, warn};

use crate::client::NasClient;
use crate::credentials::CredentialResolver;
use crate::error::{ClientError, Result};
use crate::redact::REDACTED;

/// Authentication state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
}

enum Login<'a> {
    ApiKey(&'a str),
    Password { username: &'a str, password: &'a str },
}

impl Login<'_> {
    fn method(&self) -> &'static str {
        match self {
            Login::ApiKey(_) => "auth.login_with_api_key",
            Login::Password { .. } => "auth.login",
        }
    }

    fn params(&self) -> Vec<Value> {
        match self {
            Login::ApiKey(key) => vec![json!(key)],
            Login::Password { username, password } => vec![json!(username), json!(password)],
        }
    }

    fn logged_params(&self) -> Value {
        match self {
            Login::ApiKey(_) => json!([REDACTED]),
            Login::Password { username, .. } => json!([username, REDACTED]),
        }
    }
}

impl NasClient {
    /// Current authentication state; `Unauthenticated` when not connected.
    pub async fn auth_state(&self) -> AuthState {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.auth)
            .unwrap_or_default()
    }

    /// Whether the current session is authenticated.
    pub async fn is_authenticated(&self) -> bool {
        self.auth_state().await == AuthState::Authenticated
    }

    /// Authenticate with an API key, connecting first if needed.
    pub async fn login_with_api_key(&self, api_key: &str) -> Result<()> {
        if api_key.trim().is_empty() {
            return Err(ClientError::Validation("API key must not be empty".into()));
        }
        let _serial = self.login_lock.lock().await;
        self.perform_login(Login::ApiKey(api_key))
            .instrument(self.span().clone())
            .await
    }

    /// Authenticate with a username and password, connecting first if needed.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ClientError::Validation(
                "username and password must not be empty".into(),
            ));
        }
        let _serial = self.login_lock.lock().await;
        self.perform_login(Login::Password { username, password })
            .instrument(self.span().clone())
            .await
    }

    /// Make sure the session is authenticated.
    ///
    /// Connects if needed and does nothing when already authenticated.
    /// Credentials are resolved once; an API key wins over a username and
    /// password. Neither being present is a configuration error.
    pub async fn ensure_authenticated(&self, resolver: &impl CredentialResolver) -> Result<()> {
        let _serial = self.login_lock.lock().await;
        if self.is_authenticated().await {
            return Ok(());
        }

        let creds = resolver.resolve();
        let login = match (&creds.api_key, &creds.username, &creds.password) {
            (Some(key), _, _) => Login::ApiKey(key),
            (None, Some(username), Some(password)) => Login::Password { username, password },
            _ => {
                return Err(ClientError::Configuration(
                    "no credentials supplied: set an API key or a username and password".into(),
                ));
            }
        };

        self.perform_login(login)
            .instrument(self.span().clone())
            .await
    }

    /// Authenticate if needed, then [`call`](Self::call).
    ///
    /// Reconnects when the previous connection was dropped, which makes it
    /// the right operation to wrap in [`with_retry`](crate::with_retry).
    pub async fn authenticated_call(
        &self,
        resolver: &impl CredentialResolver,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value> {
        self.ensure_authenticated(resolver).await?;
        self.call(method, params).await
    }

    async fn perform_login(&self, login: Login<'_>) -> Result<()> {
        self.connect().await?;
        let session_id = self.begin_login().await?;

        let outcome = self
            .exchange(login.method(), login.params(), login.logged_params())
            .await;

        match outcome {
            Ok(Value::Bool(true)) => {
                if !self.set_auth_state(&session_id, AuthState::Authenticated).await {
                    warn!(session = %session_id, "connection replaced during login");
                    return Err(ClientError::connection(
                        self.endpoint(),
                        "connection was replaced during login",
                    ));
                }
                info!(method = login.method(), session = %session_id, "authenticated");
                Ok(())
            }
            Ok(other) => {
                self.set_auth_state(&session_id, AuthState::Unauthenticated).await;
                warn!(method = login.method(), "credentials rejected");
                Err(ClientError::Authentication(format!(
                    "server rejected credentials (login returned {})",
                    other
                )))
            }
            Err(ClientError::Api { payload, .. }) => {
                self.set_auth_state(&session_id, AuthState::Unauthenticated).await;
                warn!(method = login.method(), "login call failed");
                Err(ClientError::Authentication(api_reason(&payload)))
            }
            Err(e) => {
                self.set_auth_state(&session_id, AuthState::Unauthenticated).await;
                Err(e)
            }
        }
    }

    /// Mark the open session `Authenticating` and return its id.
    async fn begin_login(&self) -> Result<String> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return Err(ClientError::connection(self.endpoint(), "not connected"));
        };
        session.auth = AuthState::Authenticating;
        Ok(session.id.clone())
    }

    /// Set the state of session `session_id`. Returns false when that session
    /// is no longer the open one.
    async fn set_auth_state(&self, session_id: &str, state: AuthState) -> bool {
        match self.session.lock().await.as_mut() {
            Some(session) if session.id == session_id => {
                session.auth = state;
                true
            }
            _ => false,
        }
    }
}

fn api_reason(payload: &Value) -> String {
    payload
        .get("reason")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_wire_shape() {
        let login = Login::ApiKey("1-abc");
        assert_eq!(login.method(), "auth.login_with_api_key");
        assert_eq!(login.params(), vec![json!("1-abc")]);

        let login = Login::Password {
            username: "root",
            password: "pw",
        };
        assert_eq!(login.method(), "auth.login");
        assert_eq!(login.params(), vec![json!("root"), json!("pw")]);
    }

    #[test]
    fn test_logged_params_never_contain_secrets() {
        let logged = Login::ApiKey("1-abc").logged_params().to_string();
        assert!(!logged.contains("1-abc"));

        let logged = Login::Password {
            username: "root",
            password: "hunter2",
        }
        .logged_params()
        .to_string();
        assert!(!logged.contains("hunter2"));
        assert!(logged.contains("root"));
    }

    #[test]
    fn test_api_reason_extraction() {
        assert_eq!(api_reason(&json!({"reason": "bad key"})), "bad key");
        assert_eq!(api_reason(&json!({"message": "denied"})), "denied");
        assert_eq!(api_reason(&json!({"error": 13})), r#"{"error":13}"#);
    }
}
