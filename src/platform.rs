//! Supported social platforms.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A social platform that accounts can be connected to and published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Facebook,
    Youtube,
    Tiktok,
}

impl Platform {
    /// All platforms, in display order.
    pub const ALL: [Platform; 4] = [
        Platform::Instagram,
        Platform::Facebook,
        Platform::Youtube,
        Platform::Tiktok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
        }
    }

    /// Human-readable name used in user-facing messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Instagram => "Instagram",
            Platform::Facebook => "Facebook",
            Platform::Youtube => "YouTube",
            Platform::Tiktok => "TikTok",
        }
    }

    /// Name of the cookie carrying the anti-CSRF state for this platform's flow.
    pub fn state_cookie(&self) -> String {
        format!("{}_oauth_state", self.as_str())
    }

    /// Name of the cookie carrying the originating widget id.
    pub fn widget_cookie(&self) -> String {
        format!("{}_oauth_widget", self.as_str())
    }

    /// `source` field of the message posted back to the opener window.
    pub fn message_source(&self) -> String {
        format!("{}-oauth", self.as_str())
    }

    /// Uppercase name used in environment variable names.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Platform::Instagram => "INSTAGRAM",
            Platform::Facebook => "FACEBOOK",
            Platform::Youtube => "YOUTUBE",
            Platform::Tiktok => "TIKTOK",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a platform name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            "youtube" => Ok(Platform::Youtube),
            "tiktok" => Ok(Platform::Tiktok),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}
