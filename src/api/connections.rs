//! Connection status endpoints.
//!
//! - `GET /api/connections?userId=` lists every platform with its status
//! - `DELETE /api/:platform/connection?userId=` disconnects one platform

use super::oauth::parse_platform;
use super::{AppError, AppState};
use crate::auth::resolve_user_id;
use crate::credentials::{ConnectionRecord, PlatformIdentity};
use crate::platform::Platform;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{delete, get},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    user_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Expired,
    NotConnected,
}

/// One entry of `GET /api/connections`. Never carries tokens.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    platform: Platform,
    status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<PlatformIdentity>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    granted_scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Status of a stored connection at `now`.
///
/// A cleared token is expired. A token past its expiry still counts as
/// connected when a refresh token can renew it.
pub fn connection_status(record: &ConnectionRecord, now: DateTime<Utc>) -> ConnectionStatus {
    if !record.has_access_token {
        return ConnectionStatus::Expired;
    }
    let past_expiry = record.expires_at.map_or(false, |at| at <= now);
    if past_expiry && !record.has_refresh_token {
        ConnectionStatus::Expired
    } else {
        ConnectionStatus::Connected
    }
}

impl ConnectionSummary {
    fn from_record(record: ConnectionRecord, now: DateTime<Utc>) -> Self {
        Self {
            platform: record.platform,
            status: connection_status(&record, now),
            display_name: record.identity.display_name().map(str::to_string),
            identity: Some(record.identity),
            granted_scopes: record.granted_scopes,
            expires_at: record.expires_at,
        }
    }

    fn not_connected(platform: Platform) -> Self {
        Self {
            platform,
            status: ConnectionStatus::NotConnected,
            display_name: None,
            identity: None,
            granted_scopes: Vec::new(),
            expires_at: None,
        }
    }
}

/// Create connections API router
pub fn create_connections_router(state: AppState) -> Router {
    Router::new()
        .route("/api/connections", get(list_connections))
        .route("/api/:platform/connection", delete(disconnect))
        .with_state(state)
}

/// GET /api/connections?userId=
async fn list_connections(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let user_id = resolve_user_id(query.user_id.as_deref(), &headers);
    let now = Utc::now();

    let mut records = state.credentials.list_connections(&user_id)?;
    let connections: Vec<ConnectionSummary> = Platform::ALL
        .iter()
        .map(|platform| {
            match records.iter().position(|r| r.platform == *platform) {
                Some(index) => ConnectionSummary::from_record(records.swap_remove(index), now),
                None => ConnectionSummary::not_connected(*platform),
            }
        })
        .collect();

    Ok(Json(json!({ "userId": user_id, "connections": connections })))
}

/// DELETE /api/:platform/connection?userId=
async fn disconnect(
    State(state): State<AppState>,
    Path(platform_name): Path<String>,
    Query(query): Query<UserQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let platform = parse_platform(&platform_name)?;
    let user_id = resolve_user_id(query.user_id.as_deref(), &headers);

    if !state.credentials.delete(&user_id, platform)? {
        return Err(AppError::NotFound(format!(
            "{} is not connected",
            platform.display_name()
        )));
    }

    info!(platform = %platform, user_id = %user_id, "Platform disconnected");
    Ok(Json(json!({ "success": true, "platform": platform })))
}
