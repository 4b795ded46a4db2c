// Integration tests for POST /api/publish and POST /api/publish/check

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use mockito::Matcher;
use postbridge::api::{create_router, AppState};
use postbridge::config::{AppConfig, PlatformOAuthConfig, ProviderEndpoints};
use postbridge::credentials::{Credential, CredentialStore, PlatformIdentity};
use postbridge::platform::Platform;
use postbridge::scheduled::ScheduledPostStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    credentials: Arc<CredentialStore>,
}

fn create_test_app(provider_base: &str) -> TestApp {
    let mut config = AppConfig::default();
    config.endpoints = ProviderEndpoints::rooted_at(provider_base);
    config.oauth.youtube = PlatformOAuthConfig {
        client_id: Some("yt-client".to_string()),
        client_secret: Some("yt-secret".to_string()),
        redirect_uri: None,
    };

    let key = BASE64.encode([0u8; 32]);
    let credentials = Arc::new(CredentialStore::new(":memory:", &key).unwrap());
    let scheduled = Arc::new(ScheduledPostStore::new(":memory:").unwrap());
    let state = AppState::new(config, reqwest::Client::new(), Arc::clone(&credentials), scheduled);

    TestApp {
        router: create_router(state),
        credentials,
    }
}

fn facebook_credential() -> Credential {
    Credential {
        access_token: "EAAB-page-token".to_string(),
        refresh_token: None,
        expires_at: None,
        identity: PlatformIdentity::Facebook {
            user_id: Some("10001".to_string()),
            page_id: Some("p1".to_string()),
            page_name: Some("Corner Bakery".to_string()),
        },
        granted_scopes: vec!["pages_manage_posts".to_string()],
    }
}

async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_publish_without_user_id_is_bad_request() {
    let app = create_test_app("http://unused.test");
    let (status, json) = post_json(
        &app.router,
        "/api/publish",
        json!({"caption": "hi", "platforms": ["facebook"]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "userId is required");
}

#[tokio::test]
async fn test_publish_partial_success_keeps_request_order() {
    let mut server = mockito::Server::new_async().await;
    let feed_mock = server
        .mock("POST", "/facebook/graph/p1/feed")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("message".into(), "Fresh bread at 7".into()),
            Matcher::UrlEncoded("access_token".into(), "EAAB-page-token".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"id":"p1_123"}"#)
        .create_async()
        .await;
    let app = create_test_app(&server.url());
    app.credentials.store("alice", &facebook_credential()).unwrap();

    let (status, json) = post_json(
        &app.router,
        "/api/publish",
        json!({
            "caption": "Fresh bread at 7",
            "platforms": ["facebook", "tiktok", "myspace", "Facebook"],
            "userId": "alice"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Partially succeeded: published to 1 of 3 platforms.");

    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["platform"], "facebook");
    assert_eq!(results[0]["success"], true);
    assert_eq!(results[0]["id"], "p1_123");
    assert_eq!(results[0]["url"], "https://www.facebook.com/p1_123");
    assert_eq!(results[1]["platform"], "tiktok");
    assert_eq!(results[1]["errorCode"], "unsupported");
    assert_eq!(results[2]["platform"], "myspace");
    assert_eq!(results[2]["errorCode"], "unsupported");

    feed_mock.assert_async().await;
}

#[tokio::test]
async fn test_publish_to_unconnected_platform_reports_missing_token() {
    let app = create_test_app("http://unused.test");
    let (status, json) = post_json(
        &app.router,
        "/api/publish",
        json!({
            "caption": "Launch",
            "videoUrl": "http://unused.test/clip.mp4",
            "platforms": ["youtube"],
            "userId": "nobody"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Failed to publish to any of the 1 platform(s).");
    assert_eq!(json["results"][0]["errorCode"], "missing_token");
}

#[tokio::test]
async fn test_publish_refreshes_expired_youtube_token_before_upload() {
    let mut server = mockito::Server::new_async().await;
    let refresh_mock = server
        .mock("POST", "/google/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "1//refresh".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"access_token":"ya29.fresh","expires_in":3599,"token_type":"Bearer"}"#)
        .create_async()
        .await;
    let video_mock = server
        .mock("GET", "/media/clip.mp4")
        .with_status(200)
        .with_header("content-type", "video/mp4")
        .with_body(vec![0u8, 1, 2, 3])
        .create_async()
        .await;
    let upload_mock = server
        .mock("POST", "/upload/youtube/v3/videos")
        .match_query(Matcher::UrlEncoded("uploadType".into(), "multipart".into()))
        .match_header("authorization", "Bearer ya29.fresh")
        .with_status(200)
        .with_body(r#"{"id":"vid123","snippet":{"title":"Launch day"}}"#)
        .create_async()
        .await;

    let app = create_test_app(&server.url());
    app.credentials
        .store(
            "alice",
            &Credential {
                access_token: "ya29.stale".to_string(),
                refresh_token: Some("1//refresh".to_string()),
                expires_at: Some(Utc::now() - Duration::minutes(10)),
                identity: PlatformIdentity::Youtube {
                    channel_id: Some("UC42".to_string()),
                    channel_title: Some("Corner Bakery".to_string()),
                },
                granted_scopes: vec![],
            },
        )
        .unwrap();

    let (status, json) = post_json(
        &app.router,
        "/api/publish",
        json!({
            "caption": "Launch day\nMore details inside",
            "videoUrl": format!("{}/media/clip.mp4", server.url()),
            "platforms": ["youtube"],
            "userId": "alice"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true, "unexpected body: {}", json);
    assert_eq!(json["results"][0]["id"], "vid123");
    assert_eq!(json["results"][0]["url"], "https://www.youtube.com/watch?v=vid123");

    refresh_mock.assert_async().await;
    video_mock.assert_async().await;
    upload_mock.assert_async().await;

    // Refreshed token persisted, refresh token kept
    let stored = app.credentials.get("alice", Platform::Youtube).unwrap().unwrap();
    assert_eq!(stored.access_token, "ya29.fresh");
    assert_eq!(stored.refresh_token.as_deref(), Some("1//refresh"));
    assert!(stored.expires_at.unwrap() > Utc::now());
}

#[tokio::test]
async fn test_check_reports_configuration_errors() {
    let app = create_test_app("http://unused.test");
    app.credentials.store("alice", &facebook_credential()).unwrap();

    let (status, json) = post_json(
        &app.router,
        "/api/publish/check",
        json!({"userId": "alice", "platforms": ["facebook", "instagram"]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], false);
    let errors = json["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["platform"], "instagram");
    assert_eq!(errors[0]["kind"], "not_connected");
    let message = json["message"].as_str().unwrap();
    assert!(message.contains("• Instagram is not connected"));
}

#[tokio::test]
async fn test_check_passes_for_connected_platforms() {
    let app = create_test_app("http://unused.test");
    app.credentials.store("alice", &facebook_credential()).unwrap();

    let (status, json) = post_json(
        &app.router,
        "/api/publish/check",
        json!({"userId": "alice", "platforms": ["facebook"]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"ok": true, "errors": []}));
}

#[tokio::test]
async fn test_check_requires_user_id() {
    let app = create_test_app("http://unused.test");
    let (status, _) = post_json(
        &app.router,
        "/api/publish/check",
        json!({"platforms": ["facebook"]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
