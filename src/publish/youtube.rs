//! YouTube video upload.
//!
//! The source video is downloaded into memory, up to a configured size, and
//! sent in one `multipart/related` request: JSON metadata first, then the video bytes.

use super::adapter::{
    created_id, read_api_json, Media, PublishContent, PublishError, PublishedPost,
    PublisherAdapter,
};
use crate::config::{ProviderEndpoints, PublishConfig};
use crate::credentials::{sanitize_token, Credential};
use crate::platform::Platform;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

/// YouTube rejects titles longer than this many characters.
pub const MAX_TITLE_CHARS: usize = 100;

const FALLBACK_TITLE: &str = "Untitled video";

pub struct YoutubePublisher {
    upload_url: String,
    privacy_status: String,
    category_id: String,
    max_video_bytes: u64,
    http: reqwest::Client,
}

/// Title derived from the caption: angle brackets removed, at most 100 characters.
pub fn video_title(caption: &str) -> String {
    let cleaned: String = caption.chars().filter(|c| *c != '<' && *c != '>').collect();
    let first_line = cleaned.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return FALLBACK_TITLE.to_string();
    }
    first_line.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string()
}

/// Builds a `multipart/related` body with a JSON part followed by a binary part.
fn multipart_related(boundary: &str, metadata: &str, media_type: &str, media: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n--{b}\r\nContent-Type: {t}\r\n\r\n",
            b = boundary,
            m = metadata,
            t = media_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

impl YoutubePublisher {
    pub fn new(endpoints: &ProviderEndpoints, config: &PublishConfig, http: reqwest::Client) -> Self {
        Self {
            upload_url: endpoints.youtube_upload_url.clone(),
            privacy_status: config.youtube_privacy_status.clone(),
            category_id: config.youtube_category_id.clone(),
            max_video_bytes: config.max_video_bytes,
            http,
        }
    }

    async fn download(&self, url: &str) -> Result<(Vec<u8>, String), PublishError> {
        let mut response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::ProviderApi {
                code: Some(i64::from(status.as_u16())),
                message: format!("Could not download video from {}", url),
            });
        }
        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("video/"))
            .unwrap_or("video/*")
            .to_string();
        let too_large = || {
            PublishError::MissingRequiredMedia(format!(
                "Video at {} exceeds the {} byte upload limit",
                url, self.max_video_bytes
            ))
        };

        if response.content_length().is_some_and(|len| len > self.max_video_bytes) {
            return Err(too_large());
        }
        // Content-Length may be absent or wrong, so the running total is checked as well
        let mut video = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (video.len() + chunk.len()) as u64 > self.max_video_bytes {
                return Err(too_large());
            }
            video.extend_from_slice(&chunk);
        }
        Ok((video, media_type))
    }
}

#[async_trait]
impl PublisherAdapter for YoutubePublisher {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    fn validate(&self, content: &PublishContent) -> Result<(), PublishError> {
        match content.media() {
            Some(Media::Video(_)) => Ok(()),
            _ => Err(PublishError::MissingRequiredMedia(
                "YouTube requires a video; images and text-only posts are not supported".to_string(),
            )),
        }
    }

    async fn publish(&self, content: &PublishContent, credential: &Credential) -> Result<PublishedPost, PublishError> {
        self.validate(content)?;
        let Some(Media::Video(video_url)) = content.media() else {
            return Err(PublishError::MissingRequiredMedia("YouTube requires a video".to_string()));
        };

        let (video, media_type) = self.download(video_url).await?;
        debug!(bytes = video.len(), media_type = %media_type, "Downloaded video for YouTube upload");

        let metadata = json!({
            "snippet": {
                "title": video_title(&content.caption),
                "description": content.caption,
                "categoryId": self.category_id,
            },
            "status": {
                "privacyStatus": self.privacy_status,
            }
        })
        .to_string();
        let boundary = format!("postbridge-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &metadata, &media_type, &video);

        let response = self
            .http
            .post(format!("{}/videos", self.upload_url))
            .query(&[("uploadType", "multipart"), ("part", "snippet,status")])
            .bearer_auth(sanitize_token(&credential.access_token))
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;
        // A 401 here surfaces as token_expired
        let id = created_id(&read_api_json(response).await?)?;
        info!(video_id = %id, "Uploaded video to YouTube");

        Ok(PublishedPost {
            url: Some(format!("https://www.youtube.com/watch?v={}", id)),
            id: Some(id),
        })
    }
}
