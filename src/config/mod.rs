//! Service configuration.
//!
//! Configuration is layered: an optional TOML file (path in `POSTBRIDGE_CONFIG`)
//! provides a base, and environment variables override individual values.
//! Missing per-platform OAuth credentials are not fatal; the affected platform
//! reports `missing_env` when a flow is attempted.

use crate::platform::Platform;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

/// Lifetime of OAuth state cookies and pending flows (10 minutes).
pub const DEFAULT_STATE_TTL_SECONDS: i64 = 600;

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub endpoints: ProviderEndpoints,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public origin (e.g. `https://app.example.com`). Derived from request headers when unset.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Production mode marks cookies `Secure`.
    #[serde(default)]
    pub production: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_url: None,
            production: false,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base64-encoded 32-byte key for token encryption.
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default = "default_credentials_db")]
    pub credentials_db: String,
    #[serde(default = "default_scheduled_db")]
    pub scheduled_db: String,
}

fn default_credentials_db() -> String {
    "credentials.db".to_string()
}

fn default_scheduled_db() -> String {
    "scheduled_posts.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
            credentials_db: default_credentials_db(),
            scheduled_db: default_scheduled_db(),
        }
    }
}

/// Client registration for one platform's OAuth app.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformOAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Explicit redirect URI. Defaults to `<origin>/api/<platform>/callback`.
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

impl PlatformOAuthConfig {
    /// Returns `(client_id, client_secret)` when both are configured and non-empty.
    pub fn client_credentials(&self) -> Option<(&str, &str)> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        }
    }
}

/// YouTube authorization request overrides
#[derive(Debug, Clone, Default, Deserialize)]
pub struct YoutubeAuthOverrides {
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default)]
    pub access_type: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// OAuth configuration for all platforms
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub instagram: PlatformOAuthConfig,
    #[serde(default)]
    pub facebook: PlatformOAuthConfig,
    #[serde(default)]
    pub youtube: PlatformOAuthConfig,
    #[serde(default)]
    pub tiktok: PlatformOAuthConfig,
    #[serde(default)]
    pub youtube_overrides: YoutubeAuthOverrides,
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: i64,
}

fn default_state_ttl() -> i64 {
    DEFAULT_STATE_TTL_SECONDS
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            instagram: PlatformOAuthConfig::default(),
            facebook: PlatformOAuthConfig::default(),
            youtube: PlatformOAuthConfig::default(),
            tiktok: PlatformOAuthConfig::default(),
            youtube_overrides: YoutubeAuthOverrides::default(),
            state_ttl_seconds: default_state_ttl(),
        }
    }
}

impl OAuthConfig {
    pub fn for_platform(&self, platform: Platform) -> &PlatformOAuthConfig {
        match platform {
            Platform::Instagram => &self.instagram,
            Platform::Facebook => &self.facebook,
            Platform::Youtube => &self.youtube,
            Platform::Tiktok => &self.tiktok,
        }
    }

    fn for_platform_mut(&mut self, platform: Platform) -> &mut PlatformOAuthConfig {
        match platform {
            Platform::Instagram => &mut self.instagram,
            Platform::Facebook => &mut self.facebook,
            Platform::Youtube => &mut self.youtube,
            Platform::Tiktok => &mut self.tiktok,
        }
    }
}

/// Publishing tunables
#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    /// Facebook page to publish to. Falls back to the page resolved at connect time.
    #[serde(default)]
    pub facebook_page_id: Option<String>,
    /// Instagram business account id. Falls back to the connected account's user id.
    #[serde(default)]
    pub instagram_business_id: Option<String>,
    #[serde(default = "default_youtube_privacy_status")]
    pub youtube_privacy_status: String,
    #[serde(default = "default_youtube_category_id")]
    pub youtube_category_id: String,
    /// How many times to poll an Instagram video container before giving up.
    #[serde(default = "default_container_poll_attempts")]
    pub instagram_container_poll_attempts: u32,
    #[serde(default = "default_container_poll_interval_ms")]
    pub instagram_container_poll_interval_ms: u64,
    /// Largest source video the YouTube upload will download into memory.
    #[serde(default = "default_max_video_bytes")]
    pub max_video_bytes: u64,
}

fn default_youtube_privacy_status() -> String {
    "public".to_string()
}

fn default_youtube_category_id() -> String {
    "22".to_string()
}

fn default_container_poll_attempts() -> u32 {
    30
}

fn default_container_poll_interval_ms() -> u64 {
    2000
}

fn default_max_video_bytes() -> u64 {
    256 * 1024 * 1024
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            facebook_page_id: None,
            instagram_business_id: None,
            youtube_privacy_status: default_youtube_privacy_status(),
            youtube_category_id: default_youtube_category_id(),
            instagram_container_poll_attempts: default_container_poll_attempts(),
            instagram_container_poll_interval_ms: default_container_poll_interval_ms(),
            max_video_bytes: default_max_video_bytes(),
        }
    }
}

impl PublishConfig {
    /// Configured account id that takes precedence over the connected identity's target.
    pub fn target_override(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Facebook => self.facebook_page_id.as_deref(),
            Platform::Instagram => self.instagram_business_id.as_deref(),
            Platform::Youtube | Platform::Tiktok => None,
        }
    }
}

/// Provider endpoint URLs.
///
/// Defaults are the production endpoints; tests point these at a local stub server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderEndpoints {
    pub instagram_auth_url: String,
    pub instagram_token_url: String,
    pub instagram_graph_url: String,
    pub facebook_auth_url: String,
    pub facebook_graph_url: String,
    pub google_auth_url: String,
    pub google_token_url: String,
    pub youtube_api_url: String,
    pub youtube_upload_url: String,
    pub tiktok_auth_url: String,
    pub tiktok_token_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            instagram_auth_url: "https://api.instagram.com/oauth/authorize".to_string(),
            instagram_token_url: "https://api.instagram.com/oauth/access_token".to_string(),
            instagram_graph_url: "https://graph.instagram.com/v21.0".to_string(),
            facebook_auth_url: "https://www.facebook.com/v21.0/dialog/oauth".to_string(),
            facebook_graph_url: "https://graph.facebook.com/v21.0".to_string(),
            google_auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            google_token_url: "https://oauth2.googleapis.com/token".to_string(),
            youtube_api_url: "https://www.googleapis.com/youtube/v3".to_string(),
            youtube_upload_url: "https://www.googleapis.com/upload/youtube/v3".to_string(),
            tiktok_auth_url: "https://www.tiktok.com/v2/auth/authorize/".to_string(),
            tiktok_token_url: "https://open.tiktokapis.com/v2/oauth/token/".to_string(),
        }
    }
}

impl ProviderEndpoints {
    /// Every endpoint rooted under one base URL, keeping each provider's path distinct.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            instagram_auth_url: format!("{}/instagram/oauth/authorize", base),
            instagram_token_url: format!("{}/instagram/oauth/access_token", base),
            instagram_graph_url: format!("{}/instagram/graph", base),
            facebook_auth_url: format!("{}/facebook/dialog/oauth", base),
            facebook_graph_url: format!("{}/facebook/graph", base),
            google_auth_url: format!("{}/google/auth", base),
            google_token_url: format!("{}/google/token", base),
            youtube_api_url: format!("{}/youtube/v3", base),
            youtube_upload_url: format!("{}/upload/youtube/v3", base),
            tiktok_auth_url: format!("{}/tiktok/auth/authorize/", base),
            tiktok_token_url: format!("{}/tiktok/oauth/token/", base),
        }
    }
}

impl AppConfig {
    /// Build from the optional config file plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = match env_opt("POSTBRIDGE_CONFIG") {
            Some(path) => load_config(&path)?,
            None => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    /// Overlay environment variables on top of the current values.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_opt("POSTBRIDGE_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = env_opt("POSTBRIDGE_PUBLIC_URL") {
            self.server.public_url = Some(v.trim_end_matches('/').to_string());
        }
        if let Some(v) = env_opt("POSTBRIDGE_ENV") {
            self.server.production = v.eq_ignore_ascii_case("production");
        }
        if let Some(v) = env_opt("POSTBRIDGE_ENCRYPTION_KEY") {
            self.storage.encryption_key = Some(v);
        }
        if let Some(v) = env_opt("POSTBRIDGE_CREDENTIALS_DB") {
            self.storage.credentials_db = v;
        }
        if let Some(v) = env_opt("POSTBRIDGE_SCHEDULED_DB") {
            self.storage.scheduled_db = v;
        }

        for platform in Platform::ALL {
            let prefix = format!("POSTBRIDGE_OAUTH_{}", platform.env_prefix());
            let entry = self.oauth.for_platform_mut(platform);
            if let Some(v) = env_opt(&format!("{}_CLIENT_ID", prefix)) {
                entry.client_id = Some(v);
            }
            if let Some(v) = env_opt(&format!("{}_CLIENT_SECRET", prefix)) {
                entry.client_secret = Some(v);
            }
            if let Some(v) = env_opt(&format!("{}_REDIRECT_URI", prefix)) {
                entry.redirect_uri = Some(v);
            }
        }

        if let Some(v) = env_opt("POSTBRIDGE_OAUTH_YOUTUBE_SCOPES") {
            self.oauth.youtube_overrides.scopes = Some(
                v.split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        if let Some(v) = env_opt("POSTBRIDGE_OAUTH_YOUTUBE_ACCESS_TYPE") {
            self.oauth.youtube_overrides.access_type = Some(v);
        }
        if let Some(v) = env_opt("POSTBRIDGE_OAUTH_YOUTUBE_PROMPT") {
            self.oauth.youtube_overrides.prompt = Some(v);
        }

        if let Some(v) = env_opt("POSTBRIDGE_FACEBOOK_PAGE_ID") {
            self.publish.facebook_page_id = Some(v);
        }
        if let Some(v) = env_opt("POSTBRIDGE_INSTAGRAM_BUSINESS_ID") {
            self.publish.instagram_business_id = Some(v);
        }
        if let Some(v) = env_opt("POSTBRIDGE_YOUTUBE_PRIVACY_STATUS") {
            self.publish.youtube_privacy_status = v;
        }
        if let Some(v) = env_opt("POSTBRIDGE_YOUTUBE_CATEGORY_ID") {
            self.publish.youtube_category_id = v;
        }
        if let Some(v) = env_opt("POSTBRIDGE_MAX_VIDEO_BYTES") {
            match v.parse() {
                Ok(bytes) => self.publish.max_video_bytes = bytes,
                Err(_) => warn!(value = %v, "Ignoring invalid POSTBRIDGE_MAX_VIDEO_BYTES"),
            }
        }
    }
}

/// Reads an environment variable, treating empty values as unset.
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
