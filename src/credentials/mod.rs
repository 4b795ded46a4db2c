//! Per-user, per-platform OAuth credentials.
//!
//! Tokens are sealed with AES-256-GCM and kept in SQLite, one row per
//! (user, platform). A successful OAuth flow replaces the row entirely; a token
//! refresh only rewrites the token columns.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ CredentialStore              │  upsert / get / update_tokens / clear_tokens
//! └──────────────────────────────┘
//!        ↓ seal          ↑ open
//! ┌──────────────────────────────┐
//! │ TokenCipher (AES-256-GCM)    │  unique nonce per token
//! └──────────────────────────────┘
//!        ↓                ↑
//! ┌──────────────────────────────┐
//! │ SQLite                       │  identity + scopes stored as JSON
//! └──────────────────────────────┘
//! ```

use crate::platform::Platform;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

mod encryption;
mod storage;

pub use encryption::{validate_key, SealedToken, TokenCipher};
pub use storage::{ConnectionRecord, CredentialStore};

/// Account, page, or channel that a credential acts on behalf of.
///
/// Fields are optional because enrichment after token exchange may fail
/// without failing the OAuth flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PlatformIdentity {
    Instagram {
        user_id: Option<String>,
        username: Option<String>,
    },
    Facebook {
        user_id: Option<String>,
        page_id: Option<String>,
        page_name: Option<String>,
    },
    Youtube {
        channel_id: Option<String>,
        channel_title: Option<String>,
    },
    Tiktok {
        open_id: Option<String>,
    },
}

impl PlatformIdentity {
    /// An identity with every field unknown.
    pub fn unknown(platform: Platform) -> Self {
        match platform {
            Platform::Instagram => PlatformIdentity::Instagram {
                user_id: None,
                username: None,
            },
            Platform::Facebook => PlatformIdentity::Facebook {
                user_id: None,
                page_id: None,
                page_name: None,
            },
            Platform::Youtube => PlatformIdentity::Youtube {
                channel_id: None,
                channel_title: None,
            },
            Platform::Tiktok => PlatformIdentity::Tiktok { open_id: None },
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            PlatformIdentity::Instagram { .. } => Platform::Instagram,
            PlatformIdentity::Facebook { .. } => Platform::Facebook,
            PlatformIdentity::Youtube { .. } => Platform::Youtube,
            PlatformIdentity::Tiktok { .. } => Platform::Tiktok,
        }
    }

    /// The identifier publish calls are addressed to (user id, page id, channel id, open id).
    pub fn publish_target(&self) -> Option<&str> {
        match self {
            PlatformIdentity::Instagram { user_id, .. } => user_id.as_deref(),
            PlatformIdentity::Facebook { page_id, .. } => page_id.as_deref(),
            PlatformIdentity::Youtube { channel_id, .. } => channel_id.as_deref(),
            PlatformIdentity::Tiktok { open_id } => open_id.as_deref(),
        }
    }

    /// Name of the field `publish_target` reads, for configuration messages.
    pub fn publish_target_label(&self) -> &'static str {
        match self {
            PlatformIdentity::Instagram { .. } => "business account id",
            PlatformIdentity::Facebook { .. } => "page id",
            PlatformIdentity::Youtube { .. } => "channel id",
            PlatformIdentity::Tiktok { .. } => "open id",
        }
    }

    /// Best display name for the connected account.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            PlatformIdentity::Instagram { username, user_id } => {
                username.as_deref().or(user_id.as_deref())
            }
            PlatformIdentity::Facebook {
                page_name, page_id, ..
            } => page_name.as_deref().or(page_id.as_deref()),
            PlatformIdentity::Youtube {
                channel_title,
                channel_id,
            } => channel_title.as_deref().or(channel_id.as_deref()),
            PlatformIdentity::Tiktok { open_id } => open_id.as_deref(),
        }
    }
}

/// OAuth credential for one platform.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credential {
    /// Access token used for API requests
    pub access_token: String,

    /// Refresh token, when the provider issued one
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC). `None` means the provider reported no expiry.
    pub expires_at: Option<DateTime<Utc>>,

    /// Account the token acts for
    pub identity: PlatformIdentity,

    /// Scopes reported by the provider at exchange time, in provider order
    pub granted_scopes: Vec<String>,
}

impl Credential {
    pub fn platform(&self) -> Platform {
        self.identity.platform()
    }

    /// True when `expires_at` is known and not after `now`. A pure function of its inputs.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| expires_at <= now)
    }

    /// True when the token is missing an expiry or expires strictly before `now + window`.
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < now + window,
            None => true,
        }
    }
}

/// Absolute expiry for an `expires_in` (seconds) reported at `issued_at`.
pub fn expiry_from(issued_at: DateTime<Utc>, expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in.map(|seconds| issued_at + Duration::seconds(seconds))
}

/// Strips whitespace and control characters that creep into pasted tokens.
pub fn sanitize_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect()
}
