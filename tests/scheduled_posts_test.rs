// Integration tests for /api/scheduled-posts

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use postbridge::api::{create_router, AppState};
use postbridge::config::AppConfig;
use postbridge::credentials::CredentialStore;
use postbridge::scheduled::ScheduledPostStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_app() -> Router {
    let key = BASE64.encode([0u8; 32]);
    let credentials = Arc::new(CredentialStore::new(":memory:", &key).unwrap());
    let scheduled = Arc::new(ScheduledPostStore::new(":memory:").unwrap());
    create_router(AppState::new(
        AppConfig::default(),
        reqwest::Client::new(),
        credentials,
        scheduled,
    ))
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn new_post(date: &str, time: &str) -> Value {
    json!({
        "userId": "alice",
        "content": "Weekend special: sourdough",
        "platforms": ["instagram", "facebook"],
        "scheduledDate": date,
        "scheduledTime": time,
        "mediaUrls": ["https://cdn.example.com/loaf.jpg"]
    })
}

#[tokio::test]
async fn test_create_and_list_in_schedule_order() {
    let app = create_test_app();

    let (status, later) = send(&app, "POST", "/api/scheduled-posts", Some(new_post("2099-06-02", "09:00"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(later["status"], "pending");
    assert_eq!(later["platforms"], json!(["instagram", "facebook"]));
    assert!(later["id"].as_str().is_some());

    let (status, earlier) = send(&app, "POST", "/api/scheduled-posts", Some(new_post("2099-06-01", "18:30"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = send(&app, "GET", "/api/scheduled-posts?userId=alice", None).await;
    assert_eq!(status, StatusCode::OK);
    let posts = json["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0]["id"], earlier["id"]);
    assert_eq!(posts[1]["id"], later["id"]);

    // Other users see nothing
    let (_, json) = send(&app, "GET", "/api/scheduled-posts?userId=bob", None).await;
    assert_eq!(json["posts"], json!([]));
}

#[tokio::test]
async fn test_create_validation_errors() {
    let app = create_test_app();

    let cases = vec![
        (json!({"content": "x", "platforms": ["facebook"], "scheduledDate": "2099-01-01", "scheduledTime": "10:00"}), "userId is required"),
        (json!({"userId": "a", "content": "  ", "platforms": ["facebook"], "scheduledDate": "2099-01-01", "scheduledTime": "10:00"}), "content must not be empty"),
        (json!({"userId": "a", "content": "x", "platforms": [], "scheduledDate": "2099-01-01", "scheduledTime": "10:00"}), "at least one platform is required"),
        (json!({"userId": "a", "content": "x", "platforms": ["myspace"], "scheduledDate": "2099-01-01", "scheduledTime": "10:00"}), "Unknown platform: myspace"),
        (json!({"userId": "a", "content": "x", "platforms": ["facebook"], "scheduledDate": "01/02/2099", "scheduledTime": "10:00"}), "scheduledDate must be YYYY-MM-DD, got '01/02/2099'"),
        (json!({"userId": "a", "content": "x", "platforms": ["facebook"], "scheduledDate": "2099-01-01", "scheduledTime": "10am"}), "scheduledTime must be HH:MM, got '10am'"),
        (json!({"userId": "a", "content": "x", "platforms": ["facebook"], "scheduledDate": "2001-01-01", "scheduledTime": "10:00"}), "scheduled time must be in the future"),
    ];

    for (body, expected) in cases {
        let (status, json) = send(&app, "POST", "/api/scheduled-posts", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "expected rejection: {}", expected);
        assert_eq!(json["error"], expected);
    }
}

#[tokio::test]
async fn test_update_post() {
    let app = create_test_app();
    let (_, created) = send(&app, "POST", "/api/scheduled-posts", Some(new_post("2099-06-01", "09:00"))).await;
    let id = created["id"].as_str().unwrap();

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/scheduled-posts?id={}&userId=alice", id),
        Some(json!({"content": "Updated copy", "scheduledTime": "11:15", "status": "cancelled"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["content"], "Updated copy");
    assert_eq!(updated["scheduledTime"], "11:15");
    assert_eq!(updated["status"], "cancelled");
    assert_eq!(updated["createdAt"], created["createdAt"]);

    // Rescheduling into the past is rejected and nothing changes
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/scheduled-posts?id={}&userId=alice", id),
        Some(json!({"scheduledDate": "2001-01-01", "content": "should not stick"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/scheduled-posts?id={}&userId=alice", id),
        Some(json!({"status": "archived"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = send(&app, "GET", "/api/scheduled-posts?userId=alice", None).await;
    assert_eq!(json["posts"][0]["content"], "Updated copy");
    assert_eq!(json["posts"][0]["scheduledDate"], "2099-06-01");
}

#[tokio::test]
async fn test_update_and_delete_missing_post() {
    let app = create_test_app();

    let (status, _) = send(&app, "PUT", "/api/scheduled-posts?id=ghost", Some(json!({"content": "x"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "DELETE", "/api/scheduled-posts?id=ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(&app, "DELETE", "/api/scheduled-posts", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "id is required");
}

#[tokio::test]
async fn test_delete_post() {
    let app = create_test_app();
    let (_, created) = send(&app, "POST", "/api/scheduled-posts", Some(new_post("2099-06-01", "09:00"))).await;
    let id = created["id"].as_str().unwrap();

    let (status, json) = send(&app, "DELETE", &format!("/api/scheduled-posts?id={}&userId=alice", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (_, json) = send(&app, "GET", "/api/scheduled-posts?userId=alice", None).await;
    assert_eq!(json["posts"], json!([]));
}

#[tokio::test]
async fn test_other_users_cannot_modify_post() {
    let app = create_test_app();
    let (_, created) = send(&app, "POST", "/api/scheduled-posts", Some(new_post("2099-06-01", "09:00"))).await;
    let id = created["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/scheduled-posts?id={}&userId=bob", id),
        Some(json!({"content": "not yours"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Falls back to the bearer token when no userId is given
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/scheduled-posts?id={}", id))
        .header("authorization", "Bearer bob")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (_, json) = send(&app, "GET", "/api/scheduled-posts?userId=alice", None).await;
    assert_eq!(json["posts"].as_array().unwrap().len(), 1);
    assert_eq!(json["posts"][0]["content"], created["content"]);
}
