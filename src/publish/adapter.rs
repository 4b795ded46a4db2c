//! Publisher adapter interface and the failure taxonomy adapters report.

use crate::credentials::{Credential, PlatformIdentity};
use crate::platform::Platform;
use crate::tokens::TokenError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Content of one publish request, shared by every target platform.
#[derive(Clone, Debug, Default)]
pub struct PublishContent {
    pub caption: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
}

impl PublishContent {
    /// Media to publish. A video wins over an image when both are given.
    pub fn media(&self) -> Option<Media<'_>> {
        match (&self.video_url, &self.image_url) {
            (Some(video), _) => Some(Media::Video(video)),
            (None, Some(image)) => Some(Media::Image(image)),
            (None, None) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Media<'a> {
    Image(&'a str),
    Video(&'a str),
}

/// A post that went live.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PublishedPost {
    pub id: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PublishError {
    #[error("{0} is not connected; connect the account first")]
    MissingToken(Platform),

    #[error("Access token expired: {0}")]
    TokenExpired(String),

    #[error("{0}")]
    MissingRequiredMedia(String),

    #[error("Provider API error{}: {message}", .code.map(|c| format!(" {}", c)).unwrap_or_default())]
    ProviderApi { code: Option<i64>, message: String },

    #[error("{0}")]
    MissingPlatformConfig(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PublishError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PublishError::MissingToken(_) => "missing_token",
            PublishError::TokenExpired(_) => "token_expired",
            PublishError::MissingRequiredMedia(_) => "missing_required_media",
            PublishError::ProviderApi { .. } => "provider_api_error",
            PublishError::MissingPlatformConfig(_) => "missing_platform_config",
            PublishError::Unsupported(_) => "unsupported",
            PublishError::Network(_) => "network_error",
            PublishError::Internal(_) => "internal_error",
        }
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        PublishError::Network(e.to_string())
    }
}

impl From<TokenError> for PublishError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::NoToken(platform) => PublishError::MissingToken(platform),
            TokenError::NoRefreshTokenAvailable(_)
            | TokenError::RefreshTokenExpired(_)
            | TokenError::RefreshUnsupported(_) => PublishError::TokenExpired(e.to_string()),
            TokenError::RefreshFailed(message) => PublishError::ProviderApi {
                code: None,
                message: format!("Token refresh failed: {}", message),
            },
            TokenError::Storage(e) => PublishError::Internal(format!("{:#}", e)),
        }
    }
}

/// Error code Graph API uses for invalid or expired access tokens.
const GRAPH_INVALID_TOKEN: i64 = 190;

/// Maps a failed provider response to a [`PublishError`].
///
/// Understands the `{"error": {"code", "message"}}` envelope used by both the
/// Graph API and Google APIs.
pub fn provider_error(status: u16, body: &str) -> PublishError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let code = error.and_then(|e| e.get("code")).and_then(Value::as_i64);
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("status {}: {}", status, body));

    if status == 401 || code == Some(GRAPH_INVALID_TOKEN) {
        PublishError::TokenExpired(message)
    } else {
        PublishError::ProviderApi { code, message }
    }
}

/// Reads a JSON body, mapping non-2xx statuses through [`provider_error`].
pub async fn read_api_json(response: reqwest::Response) -> Result<Value, PublishError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(provider_error(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| PublishError::ProviderApi {
        code: None,
        message: format!("invalid JSON ({}): {}", e, body),
    })
}

/// Pulls the `id` a provider returned for a created object.
pub fn created_id(body: &Value) -> Result<String, PublishError> {
    crate::oauth::exchange::id_field(body, "id").ok_or_else(|| PublishError::ProviderApi {
        code: None,
        message: format!("response has no id: {}", body),
    })
}

/// Account a post is addressed to: the configured override, else the id resolved at connect time.
///
/// The pre-publish check calls this too, so both agree on what a complete setup is.
/// A Facebook target equal to the user's own id means no page was resolved.
pub fn resolve_publish_target<'a>(
    identity: &'a PlatformIdentity,
    override_id: Option<&'a str>,
) -> Result<&'a str, PublishError> {
    let target = override_id
        .filter(|id| !id.is_empty())
        .or(identity.publish_target())
        .filter(|id| !id.is_empty());

    if let PlatformIdentity::Facebook { user_id: Some(user_id), .. } = identity {
        if target == Some(user_id.as_str()) {
            return Err(PublishError::MissingPlatformConfig(
                "Facebook page id matches the user id; posts must target a page".to_string(),
            ));
        }
    }

    target.ok_or_else(|| {
        let label = identity.platform().display_name();
        PublishError::MissingPlatformConfig(format!(
            "{} setup is incomplete: no {} found. Reconnect your {} account.",
            label,
            identity.publish_target_label(),
            label
        ))
    })
}

/// One platform's publish protocol.
///
/// `validate` runs before any token lookup or network call, so requests that
/// cannot succeed fail fast.
#[async_trait]
pub trait PublisherAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    fn validate(&self, content: &PublishContent) -> Result<(), PublishError>;

    async fn publish(&self, content: &PublishContent, credential: &Credential) -> Result<PublishedPost, PublishError>;
}

/// Per-platform entry of a publish response.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PlatformResult {
    pub platform: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "errorCode", skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl PlatformResult {
    pub fn from_outcome(platform: &str, outcome: Result<PublishedPost, PublishError>) -> Self {
        match outcome {
            Ok(post) => Self {
                platform: platform.to_string(),
                success: true,
                id: post.id,
                url: post.url,
                error: None,
                error_code: None,
            },
            Err(e) => Self::failure(platform, e.to_string(), Some(e.code())),
        }
    }

    pub fn failure(platform: &str, error: String, code: Option<&str>) -> Self {
        Self {
            platform: platform.to_string(),
            success: false,
            id: None,
            url: None,
            error: Some(error),
            error_code: code.map(str::to_string),
        }
    }
}
