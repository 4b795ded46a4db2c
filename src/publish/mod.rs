//! Publish dispatcher.
//!
//! One request fans out to one adapter call per platform. Each call is
//! isolated: a failure on one platform is reported in its own result entry
//! and never stops the others.
//!
//! ```text
//! PublishRequest ─→ validate ─→ TokenRefreshManager ─→ PublisherAdapter ─→ PlatformResult
//!                   (no I/O)     (may refresh)          (platform protocol)
//! ```

pub mod adapter;
pub mod facebook;
pub mod instagram;
pub mod tiktok;
pub mod youtube;

pub use adapter::{
    resolve_publish_target, Media, PlatformResult, PublishContent, PublishError, PublishedPost,
    PublisherAdapter,
};

use crate::config::AppConfig;
use crate::platform::Platform;
use crate::tokens::TokenRefreshManager;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Body of `POST /api/publish`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    #[serde(default)]
    pub caption: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
    pub user_id: Option<String>,
}

impl PublishRequest {
    pub fn content(&self) -> PublishContent {
        PublishContent {
            caption: self.caption.clone(),
            image_url: non_blank(&self.image_url),
            video_url: non_blank(&self.video_url),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Aggregated outcome of a publish request.
#[derive(Clone, Debug, Serialize)]
pub struct PublishSummary {
    /// True when at least one platform succeeded
    pub success: bool,
    pub results: Vec<PlatformResult>,
    pub message: String,
}

impl PublishSummary {
    pub fn from_results(results: Vec<PlatformResult>) -> Self {
        let total = results.len();
        let succeeded = results.iter().filter(|r| r.success).count();
        let message = if succeeded == total {
            format!("Successfully published to all {} platform(s).", total)
        } else if succeeded > 0 {
            format!(
                "Partially succeeded: published to {} of {} platforms.",
                succeeded, total
            )
        } else {
            format!("Failed to publish to any of the {} platform(s).", total)
        };
        Self {
            success: succeeded > 0,
            results,
            message,
        }
    }
}

/// Request-level failures; nothing was dispatched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("userId is required")]
    MissingUserId,

    #[error("At least one platform is required")]
    NoPlatforms,
}

pub struct PublishDispatcher {
    tokens: Arc<TokenRefreshManager>,
    adapters: HashMap<Platform, Arc<dyn PublisherAdapter>>,
}

impl PublishDispatcher {
    /// Dispatcher with the built-in adapter for every platform.
    pub fn new(config: &AppConfig, http: reqwest::Client, tokens: Arc<TokenRefreshManager>) -> Self {
        let adapters: Vec<Arc<dyn PublisherAdapter>> = vec![
            Arc::new(instagram::InstagramPublisher::new(&config.endpoints, &config.publish, http.clone())),
            Arc::new(facebook::FacebookPublisher::new(&config.endpoints, &config.publish, http.clone())),
            Arc::new(youtube::YoutubePublisher::new(&config.endpoints, &config.publish, http)),
            Arc::new(tiktok::TiktokPublisher),
        ];
        Self::with_adapters(tokens, adapters)
    }

    pub fn with_adapters(tokens: Arc<TokenRefreshManager>, adapters: Vec<Arc<dyn PublisherAdapter>>) -> Self {
        Self {
            tokens,
            adapters: adapters.into_iter().map(|a| (a.platform(), a)).collect(),
        }
    }

    /// Publishes to every requested platform and aggregates the results in request order.
    pub async fn publish(&self, request: &PublishRequest) -> Result<PublishSummary, DispatchError> {
        let user_id = request
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(DispatchError::MissingUserId)?
            .to_string();

        let mut names: Vec<String> = Vec::new();
        for name in &request.platforms {
            let name = name.trim().to_lowercase();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
        if names.is_empty() {
            return Err(DispatchError::NoPlatforms);
        }

        let content = Arc::new(request.content());
        info!(user_id = %user_id, platforms = ?names, "Dispatching publish request");

        let tasks = names.into_iter().map(|name| {
            let adapter = name
                .parse::<Platform>()
                .ok()
                .and_then(|p| self.adapters.get(&p).cloned());
            let tokens = self.tokens.clone();
            let content = content.clone();
            let user_id = user_id.clone();

            async move {
                let Some(adapter) = adapter else {
                    return PlatformResult::failure(
                        &name,
                        format!("Unsupported platform: {}", name),
                        Some("unsupported"),
                    );
                };
                let handle = tokio::spawn(async move {
                    let outcome = publish_one(adapter.as_ref(), &tokens, &user_id, &content).await;
                    if let Err(e) = &outcome {
                        warn!(platform = %adapter.platform(), code = e.code(), error = %e, "Publish failed");
                    }
                    outcome
                });
                match handle.await {
                    Ok(outcome) => PlatformResult::from_outcome(&name, outcome),
                    Err(e) => {
                        error!(platform = %name, error = %e, "Publish task aborted");
                        PlatformResult::failure(&name, "Internal error while publishing".to_string(), Some("internal_error"))
                    }
                }
            }
        });

        let summary = PublishSummary::from_results(join_all(tasks).await);
        info!(user_id = %user_id, success = summary.success, "{}", summary.message);
        Ok(summary)
    }
}

async fn publish_one(
    adapter: &dyn PublisherAdapter,
    tokens: &TokenRefreshManager,
    user_id: &str,
    content: &PublishContent,
) -> Result<PublishedPost, PublishError> {
    adapter.validate(content)?;
    let token = tokens.get_valid_token(user_id, adapter.platform()).await?;
    adapter.publish(content, &token.credential).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credential, CredentialStore, PlatformIdentity};
    use crate::oauth::FlowCatalog;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Adapter with a canned outcome that counts its calls.
    struct StubAdapter {
        platform: Platform,
        outcome: Result<PublishedPost, PublishError>,
        calls: AtomicUsize,
    }

    impl StubAdapter {
        fn new(platform: Platform, outcome: Result<PublishedPost, PublishError>) -> Arc<Self> {
            Arc::new(Self {
                platform,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PublisherAdapter for StubAdapter {
        fn platform(&self) -> Platform {
            self.platform
        }

        fn validate(&self, _content: &PublishContent) -> Result<(), PublishError> {
            Ok(())
        }

        async fn publish(&self, _content: &PublishContent, _credential: &Credential) -> Result<PublishedPost, PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn tokens_with(platforms: &[Platform]) -> Arc<TokenRefreshManager> {
        let store = Arc::new(CredentialStore::new(":memory:", &BASE64.encode([1u8; 32])).unwrap());
        for platform in platforms {
            store
                .store(
                    "u1",
                    &Credential {
                        access_token: "tok".to_string(),
                        refresh_token: None,
                        expires_at: None,
                        identity: PlatformIdentity::unknown(*platform),
                        granted_scopes: vec![],
                    },
                )
                .unwrap();
        }
        let catalog = FlowCatalog::new(Arc::new(AppConfig::default()), reqwest::Client::new());
        Arc::new(TokenRefreshManager::new(store, Arc::new(catalog)))
    }

    fn ok(id: &str) -> Result<PublishedPost, PublishError> {
        Ok(PublishedPost {
            id: Some(id.to_string()),
            url: None,
        })
    }

    fn request(platforms: &[&str]) -> PublishRequest {
        PublishRequest {
            caption: "hello".to_string(),
            image_url: Some("https://cdn.test/a.jpg".to_string()),
            video_url: None,
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
            user_id: Some("u1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_order() {
        let tokens = tokens_with(&[Platform::Instagram, Platform::Facebook, Platform::Youtube]);
        let failing = StubAdapter::new(
            Platform::Facebook,
            Err(PublishError::ProviderApi {
                code: Some(100),
                message: "Invalid parameter".to_string(),
            }),
        );
        let dispatcher = PublishDispatcher::with_adapters(
            tokens,
            vec![
                StubAdapter::new(Platform::Instagram, ok("ig-1")),
                failing.clone(),
                StubAdapter::new(Platform::Youtube, ok("yt-1")),
            ],
        );

        let summary = dispatcher
            .publish(&request(&["instagram", "facebook", "youtube"]))
            .await
            .unwrap();
        assert!(summary.success);
        assert!(summary.message.contains("Partially"));
        let order: Vec<_> = summary.results.iter().map(|r| r.platform.as_str()).collect();
        assert_eq!(order, vec!["instagram", "facebook", "youtube"]);
        assert!(summary.results[0].success);
        assert!(!summary.results[1].success);
        assert_eq!(summary.results[1].error_code.as_deref(), Some("provider_api_error"));
        assert!(summary.results[2].success);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_fail_is_distinguishable() {
        // No stored tokens at all
        let tokens = tokens_with(&[]);
        let ig = StubAdapter::new(Platform::Instagram, ok("never"));
        let dispatcher = PublishDispatcher::with_adapters(tokens, vec![ig.clone()]);

        let summary = dispatcher.publish(&request(&["instagram", "myspace"])).await.unwrap();
        assert!(!summary.success);
        assert!(summary.message.starts_with("Failed"));
        assert_eq!(summary.results.len(), 2);
        assert_eq!(summary.results[0].error_code.as_deref(), Some("missing_token"));
        assert_eq!(summary.results[1].error_code.as_deref(), Some("unsupported"));
        assert_eq!(ig.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_full_success_message() {
        let tokens = tokens_with(&[Platform::Facebook]);
        let dispatcher =
            PublishDispatcher::with_adapters(tokens, vec![StubAdapter::new(Platform::Facebook, ok("fb"))]);
        let summary = dispatcher.publish(&request(&["facebook", "Facebook"])).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.results.len(), 1);
        assert!(summary.message.starts_with("Successfully"));
    }

    #[tokio::test]
    async fn test_request_level_validation() {
        let dispatcher = PublishDispatcher::with_adapters(tokens_with(&[]), vec![]);

        let mut no_user = request(&["instagram"]);
        no_user.user_id = Some("  ".to_string());
        assert_eq!(dispatcher.publish(&no_user).await.unwrap_err(), DispatchError::MissingUserId);

        assert_eq!(
            dispatcher.publish(&request(&[])).await.unwrap_err(),
            DispatchError::NoPlatforms
        );
    }

    #[tokio::test]
    async fn test_instagram_caption_only_fails_before_token_lookup() {
        let tokens = tokens_with(&[]);
        let config = AppConfig::default();
        let dispatcher = PublishDispatcher::new(&config, reqwest::Client::new(), tokens);
        let mut req = request(&["instagram", "tiktok"]);
        req.image_url = None;

        let summary = dispatcher.publish(&req).await.unwrap();
        assert_eq!(summary.results[0].error_code.as_deref(), Some("missing_required_media"));
        assert!(summary.results[0].error.as_deref().unwrap().contains("image or video"));
        assert_eq!(summary.results[1].error_code.as_deref(), Some("unsupported"));
    }

    #[test]
    fn test_request_deserialization() {
        let req: PublishRequest = serde_json::from_str(
            r#"{"caption":"hi","videoUrl":"https://cdn.test/v.mp4","imageUrl":"","platforms":["youtube"],"userId":"u"}"#,
        )
        .unwrap();
        let content = req.content();
        assert_eq!(content.image_url, None);
        assert_eq!(content.media(), Some(Media::Video("https://cdn.test/v.mp4")));
        assert_eq!(req.user_id.as_deref(), Some("u"));
    }
}
