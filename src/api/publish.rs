//! Publish endpoints.
//!
//! - `POST /api/publish`: fan a post out to the requested platforms
//! - `POST /api/publish/check`: configuration check without publishing

use super::{AppError, AppState};
use crate::preflight::{check_configuration, format_config_errors, ConfigError};
use crate::publish::{DispatchError, PublishRequest, PublishSummary};
use axum::{extract::State, response::Json, routing::post, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Body of `POST /api/publish/check`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    user_id: Option<String>,
    #[serde(default)]
    platforms: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    ok: bool,
    errors: Vec<ConfigError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Create publish API router
pub fn create_publish_router(state: AppState) -> Router {
    Router::new()
        .route("/api/publish", post(publish))
        .route("/api/publish/check", post(check))
        .with_state(state)
}

/// POST /api/publish
///
/// Always 200 once dispatched; per-platform failures live in `results`.
async fn publish(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishSummary>, AppError> {
    let summary = state
        .dispatcher
        .publish(&request)
        .await
        .map_err(|e: DispatchError| AppError::BadRequest(e.to_string()))?;

    info!(
        user_id = ?request.user_id,
        success = summary.success,
        platforms = summary.results.len(),
        "Publish request completed"
    );
    Ok(Json(summary))
}

/// POST /api/publish/check
async fn check(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, AppError> {
    let user_id = request
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::BadRequest(DispatchError::MissingUserId.to_string()))?;

    let errors = check_configuration(
        &state.credentials,
        &state.config.publish,
        user_id,
        &request.platforms,
        Utc::now(),
    )?;
    let message = format_config_errors(&errors);

    Ok(Json(CheckResponse {
        ok: errors.is_empty(),
        errors,
        message,
    }))
}
