//! Scheduled post CRUD on `/api/scheduled-posts`.
//!
//! Collection and item share one path; the item is selected with `?id=`.

use super::{AppError, AppState};
use crate::auth::resolve_user_id;
use crate::scheduled::{NewScheduledPost, ScheduledPost, ScheduledPostUpdate};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    user_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuery {
    id: Option<String>,
    user_id: Option<String>,
}

impl ItemQuery {
    fn required_id(&self) -> Result<&str, AppError> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::BadRequest("id is required".to_string()))
    }
}

/// Create scheduled posts API router
pub fn create_scheduled_posts_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/scheduled-posts",
            get(list_posts)
                .post(create_post)
                .put(update_post)
                .delete(delete_post),
        )
        .with_state(state)
}

/// GET /api/scheduled-posts?userId=
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let user_id = resolve_user_id(query.user_id.as_deref(), &headers);
    let posts = state.scheduled.list_for_user(&user_id)?;
    Ok(Json(json!({ "posts": posts })))
}

/// POST /api/scheduled-posts
async fn create_post(
    State(state): State<AppState>,
    Json(body): Json<NewScheduledPost>,
) -> Result<(StatusCode, Json<ScheduledPost>), AppError> {
    let post = body
        .into_post(Utc::now())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    state.scheduled.insert(&post)?;

    info!(
        post_id = %post.id,
        user_id = %post.user_id,
        scheduled_date = %post.scheduled_date,
        scheduled_time = %post.scheduled_time,
        "Scheduled post created"
    );
    Ok((StatusCode::CREATED, Json(post)))
}

/// PUT /api/scheduled-posts?id=&userId=
///
/// Another user's post is reported as not found.
async fn update_post(
    State(state): State<AppState>,
    Query(query): Query<ItemQuery>,
    headers: HeaderMap,
    Json(update): Json<ScheduledPostUpdate>,
) -> Result<Json<ScheduledPost>, AppError> {
    let id = query.required_id()?;
    let user_id = resolve_user_id(query.user_id.as_deref(), &headers);
    let mut post = state
        .scheduled
        .get(id)?
        .filter(|post| post.user_id == user_id)
        .ok_or_else(|| AppError::NotFound(format!("Scheduled post '{}' not found", id)))?;

    post.apply(update, Utc::now())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if !state.scheduled.update(&post)? {
        // Deleted between read and write
        return Err(AppError::NotFound(format!("Scheduled post '{}' not found", id)));
    }

    info!(post_id = %post.id, status = %post.status, "Scheduled post updated");
    Ok(Json(post))
}

/// DELETE /api/scheduled-posts?id=&userId=
async fn delete_post(
    State(state): State<AppState>,
    Query(query): Query<ItemQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let id = query.required_id()?;
    let user_id = resolve_user_id(query.user_id.as_deref(), &headers);
    if !state.scheduled.delete(&user_id, id)? {
        return Err(AppError::NotFound(format!("Scheduled post '{}' not found", id)));
    }

    info!(post_id = %id, user_id = %user_id, "Scheduled post deleted");
    Ok(Json(json!({ "success": true, "id": id })))
}
