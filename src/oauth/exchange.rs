//! Token exchange plumbing shared by every platform flow.
//!
//! Providers disagree on almost everything (form vs query encoding, scope
//! separators, numeric vs string ids, errors in 200 responses), so each flow
//! parses its own payload and reduces it to a [`TokenGrant`].

use crate::credentials::{Credential, PlatformIdentity};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Normalized result of an authorization-code exchange.
#[derive(Clone, Debug)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry computed from `expires_in` at exchange time
    pub expires_at: Option<DateTime<Utc>>,
    pub granted_scopes: Vec<String>,
    pub identity: PlatformIdentity,
}

impl TokenGrant {
    pub fn into_credential(self) -> Credential {
        Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
            identity: self.identity,
            granted_scopes: self.granted_scopes,
        }
    }
}

/// Result of a refresh-token grant.
#[derive(Clone, Debug)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Present only when the provider rotated the refresh token
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Failure talking to a provider's OAuth endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The provider answered with an error; `body` is the raw payload for diagnostics.
    #[error("Provider rejected the request with status {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Request to provider failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected provider response: {0}")]
    Malformed(String),
}

/// Failure refreshing an access token.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The refresh token itself is expired or revoked; the user must reconnect.
    #[error("Refresh token expired or revoked: {0}")]
    Revoked(String),

    #[error("Token refresh is not supported for this platform")]
    Unsupported,

    /// Anything else (network, 5xx, malformed body). Safe to retry.
    #[error("Token refresh failed: {0}")]
    Transient(String),
}

/// OAuth error codes that mean the refresh token can never succeed again.
const REVOKED_ERROR_CODES: &[&str] = &["invalid_grant", "unauthorized_client"];

impl RefreshError {
    /// Classifies a refresh failure from the provider's status and body.
    pub fn classify(status: u16, body: &str) -> Self {
        let error_code = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string));

        match error_code {
            Some(code)
                if (status == 400 || status == 401)
                    && REVOKED_ERROR_CODES.contains(&code.as_str()) =>
            {
                RefreshError::Revoked(body.to_string())
            }
            _ => RefreshError::Transient(format!("status {}: {}", status, body)),
        }
    }
}

/// Reads a JSON body, turning non-2xx statuses into [`ExchangeError::Provider`].
pub async fn read_json(response: reqwest::Response) -> Result<Value, ExchangeError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ExchangeError::Provider {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| ExchangeError::Malformed(format!("invalid JSON ({}): {}", e, body)))
}

/// Pulls a required string field out of a provider payload.
pub fn required_str(value: &Value, field: &str) -> Result<String, ExchangeError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ExchangeError::Malformed(format!("missing '{}' in {}", field, value)))
}

/// Reads a field that providers send either as a string or a number.
pub fn id_field(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn optional_str(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn expires_in(value: &Value) -> Option<i64> {
    match value.get("expires_in")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Splits a provider scope string on the given separator, dropping blanks and keeping order.
pub fn split_scopes(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Appends URL-encoded query parameters to an endpoint.
pub fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query)
}
