// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Log-safe copies of request params and server payloads.

use serde_json::{Map, Value};

/// Placeholder written in place of sensitive values.
pub const REDACTED: &str = "[REDACTED]";

/// Strings longer than this are truncated in log output.
pub const MAX_LOGGED_STRING: usize = 500;

const SENSITIVE_KEYS: &[&str] = &["password", "api_key", "token", "secret", "auth"];

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS
        .iter()
        .any(|sensitive| key.eq_ignore_ascii_case(sensitive))
}

/// Return a copy of `value` that is safe to log.
///
/// Values under sensitive object keys become [`REDACTED`]; long strings are
/// cut to [`MAX_LOGGED_STRING`] characters. The input is never modified.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, inner) in map {
                let cleaned = if is_sensitive(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    sanitize(inner)
                };
                out.insert(key.clone(), cleaned);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        Value::String(s) if s.chars().count() > MAX_LOGGED_STRING => {
            let head: String = s.chars().take(MAX_LOGGED_STRING).collect();
            Value::String(format!("{}... [truncated]", head))
        }
        other => other.clone(),
    }
}

/// [`sanitize`] applied to a positional parameter list.
pub fn sanitize_params(params: &[Value]) -> Value {
    Value::Array(params.iter().map(sanitize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensitive_keys_are_redacted_at_any_depth() {
        let input = json!({
            "name": "tank/media",
            "Password": "hunter2",
            "nested": [{"api_key": "1-abc", "token": 7, "keep": true}],
            "auth": {"user": "root"}
        });

        let out = sanitize(&input);
        assert_eq!(
            out,
            json!({
                "name": "tank/media",
                "Password": REDACTED,
                "nested": [{"api_key": REDACTED, "token": REDACTED, "keep": true}],
                "auth": REDACTED
            })
        );
    }

    #[test]
    fn test_input_is_untouched() {
        let input = json!({"secret": "s3cr3t"});
        let _ = sanitize(&input);
        assert_eq!(input["secret"], "s3cr3t");
    }

    #[test]
    fn test_long_strings_are_truncated() {
        let long = "x".repeat(MAX_LOGGED_STRING + 20);
        let out = sanitize(&json!(long));
        let s = out.as_str().unwrap();
        assert!(s.ends_with("... [truncated]"));
        assert_eq!(s.len(), MAX_LOGGED_STRING + "... [truncated]".len());

        let short = "y".repeat(MAX_LOGGED_STRING);
        assert_eq!(sanitize(&json!(short)), json!(short));
    }

    #[test]
    fn test_positional_params() {
        let out = sanitize_params(&[json!("tank"), json!({"password": "p"})]);
        assert_eq!(out, json!(["tank", {"password": REDACTED}]));
    }
}
