//! Acting-user resolution.
//!
//! Requests name their user explicitly (`userId` query or body field). When
//! they don't, the bearer token is used as the user id, and without one the
//! shared `default` user applies.

use axum::http::HeaderMap;

#[cfg(test)]
mod tests;

/// User id applied when a request names no user and carries no token.
pub const DEFAULT_USER_ID: &str = "default";

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, BearerError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(BearerError::Missing)?
        .to_str()
        .map_err(|_| BearerError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Parse bearer token from Authorization header value
fn parse_bearer_token(header_value: &str) -> Result<String, BearerError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(BearerError::InvalidFormat);
    }

    if parts[0].to_lowercase() != "bearer" {
        return Err(BearerError::InvalidFormat);
    }

    let token = parts[1].trim();
    if token.is_empty() {
        return Err(BearerError::Empty);
    }

    Ok(token.to_string())
}

/// Resolve the acting user: explicit id, then bearer token, then [`DEFAULT_USER_ID`].
pub fn resolve_user_id(explicit: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(user_id) = explicit.map(str::trim).filter(|u| !u.is_empty()) {
        return user_id.to_string();
    }
    extract_bearer_token(headers).unwrap_or_else(|_| DEFAULT_USER_ID.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum BearerError {
    /// Authorization header not present
    #[error("Authorization token not provided")]
    Missing,
    /// Not "Bearer <token>"
    #[error("Invalid authorization token format")]
    InvalidFormat,
    #[error("Authorization token is empty")]
    Empty,
}
