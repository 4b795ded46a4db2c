//! Scheduled posts.
//!
//! Posts are stored with a status and a UTC date/time. Nothing in this
//! service executes them; the status is only changed through the API.

mod store;

pub use store::ScheduledPostStore;

use crate::platform::Platform;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Published,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
            PostStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(PostStatus::Pending),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            "cancelled" => Ok(PostStatus::Cancelled),
            _ => Err(ValidationError::InvalidStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPost {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub platforms: Vec<Platform>,
    /// `YYYY-MM-DD`, UTC
    pub scheduled_date: String,
    /// `HH:MM`, UTC
    pub scheduled_time: String,
    pub media_urls: Vec<String>,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/scheduled-posts`. Everything is optional so missing
/// fields produce validation errors rather than deserialization failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewScheduledPost {
    pub user_id: Option<String>,
    pub content: Option<String>,
    pub platforms: Option<Vec<String>>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    #[serde(default)]
    pub media_urls: Vec<String>,
}

/// Body of `PUT /api/scheduled-posts?id=`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPostUpdate {
    pub content: Option<String>,
    pub platforms: Option<Vec<String>>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub media_urls: Option<Vec<String>>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("content must not be empty")]
    EmptyContent,

    #[error("at least one platform is required")]
    NoPlatforms,

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("scheduledDate must be YYYY-MM-DD, got '{0}'")]
    InvalidDate(String),

    #[error("scheduledTime must be HH:MM, got '{0}'")]
    InvalidTime(String),

    #[error("scheduled time must be in the future")]
    NotInFuture,

    #[error("status must be one of pending, published, failed, cancelled; got '{0}'")]
    InvalidStatus(String),
}

/// Parses the stored date and time into one UTC instant.
pub fn scheduled_instant(date: &str, time: &str) -> Result<DateTime<Utc>, ValidationError> {
    let date = date.trim();
    let time = time.trim();
    let parsed_date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .filter(|_| date.len() == 10)
        .ok_or_else(|| ValidationError::InvalidDate(date.to_string()))?;
    let parsed_time = NaiveTime::parse_from_str(time, "%H:%M")
        .ok()
        .filter(|_| time.len() == 5)
        .ok_or_else(|| ValidationError::InvalidTime(time.to_string()))?;
    Ok(parsed_date.and_time(parsed_time).and_utc())
}

fn parse_platforms(names: &[String]) -> Result<Vec<Platform>, ValidationError> {
    let mut platforms = Vec::new();
    for name in names {
        let platform = name
            .parse::<Platform>()
            .map_err(|e| ValidationError::UnknownPlatform(e.0))?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    if platforms.is_empty() {
        return Err(ValidationError::NoPlatforms);
    }
    Ok(platforms)
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField(field))
}

fn checked_content(content: &str) -> Result<String, ValidationError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    Ok(content.to_string())
}

impl NewScheduledPost {
    /// Validates the request and builds a `pending` post.
    pub fn into_post(self, now: DateTime<Utc>) -> Result<ScheduledPost, ValidationError> {
        let user_id = required(&self.user_id, "userId")?.to_string();
        let content = checked_content(self.content.as_deref().unwrap_or(""))?;
        let platforms = parse_platforms(self.platforms.as_deref().unwrap_or(&[]))?;
        let scheduled_date = required(&self.scheduled_date, "scheduledDate")?.to_string();
        let scheduled_time = required(&self.scheduled_time, "scheduledTime")?.to_string();

        if scheduled_instant(&scheduled_date, &scheduled_time)? <= now {
            return Err(ValidationError::NotInFuture);
        }

        Ok(ScheduledPost {
            id: uuid::Uuid::now_v7().to_string(),
            user_id,
            content,
            platforms,
            scheduled_date,
            scheduled_time,
            media_urls: self.media_urls,
            status: PostStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }
}

impl ScheduledPost {
    pub fn scheduled_at(&self) -> Result<DateTime<Utc>, ValidationError> {
        scheduled_instant(&self.scheduled_date, &self.scheduled_time)
    }

    /// Applies a partial update. Rescheduling must land in the future.
    pub fn apply(&mut self, update: ScheduledPostUpdate, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let mut next = self.clone();

        if let Some(content) = &update.content {
            next.content = checked_content(content)?;
        }
        if let Some(platforms) = &update.platforms {
            next.platforms = parse_platforms(platforms)?;
        }
        if let Some(date) = update.scheduled_date {
            next.scheduled_date = date.trim().to_string();
        }
        if let Some(time) = update.scheduled_time {
            next.scheduled_time = time.trim().to_string();
        }
        if let Some(media_urls) = update.media_urls {
            next.media_urls = media_urls;
        }
        if let Some(status) = &update.status {
            next.status = status.parse()?;
        }

        let rescheduled = next.scheduled_date != self.scheduled_date || next.scheduled_time != self.scheduled_time;
        let at = next.scheduled_at()?;
        if rescheduled && at <= now {
            return Err(ValidationError::NotInFuture);
        }

        next.updated_at = now;
        *self = next;
        Ok(())
    }
}
