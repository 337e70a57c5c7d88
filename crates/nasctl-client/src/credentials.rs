// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Credential sources for authentication.

use std::fmt;

use crate::redact::REDACTED;

/// Credentials supplied by the caller.
///
/// Blank or whitespace-only values are treated as absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn normalize(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Credentials {
    /// Build credentials from optional parts, dropping blank values.
    pub fn new(
        api_key: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            api_key: normalize(api_key),
            username: normalize(username),
            password: normalize(password),
        }
    }

    /// API-key credentials.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::new(Some(key.into()), None, None)
    }

    /// Username/password credentials.
    pub fn user_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(None, Some(username.into()), Some(password.into()))
    }

    /// Read `NASCTL_API_KEY`, `NASCTL_USERNAME` and `NASCTL_PASSWORD`.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("NASCTL_API_KEY").ok(),
            std::env::var("NASCTL_USERNAME").ok(),
            std::env::var("NASCTL_PASSWORD").ok(),
        )
    }

    /// True when neither an API key nor a full username/password pair is present.
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none() && (self.username.is_none() || self.password.is_none())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| REDACTED);
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .finish()
    }
}

/// Source of credentials, consulted once per authentication attempt.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self) -> Credentials;
}

impl CredentialResolver for Credentials {
    fn resolve(&self) -> Credentials {
        self.clone()
    }
}

/// Resolves credentials from the process environment at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialResolver for EnvCredentials {
    fn resolve(&self) -> Credentials {
        Credentials::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_absent() {
        let creds = Credentials::new(Some("  ".into()), Some("".into()), Some("pw".into()));
        assert_eq!(creds.api_key, None);
        assert_eq!(creds.username, None);
        assert_eq!(creds.password.as_deref(), Some("pw"));
        assert!(creds.is_empty());
    }

    #[test]
    fn test_constructors() {
        assert!(!Credentials::api_key("1-abc").is_empty());
        assert!(!Credentials::user_password("root", "pw").is_empty());
        assert!(Credentials::user_password("root", "").is_empty());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = Credentials::new(
            Some("1-topsecretkey".into()),
            Some("root".into()),
            Some("hunter2".into()),
        );
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("topsecretkey"));
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("root"));
        assert!(printed.contains(REDACTED));
    }

    #[test]
    fn test_credentials_resolve_to_themselves() {
        let creds = Credentials::api_key("k");
        assert_eq!(creds.resolve(), creds);
    }
}
