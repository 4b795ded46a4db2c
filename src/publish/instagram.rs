//! Instagram two-phase publishing: create a media container, then publish it.

use super::adapter::{
    created_id, read_api_json, resolve_publish_target, Media, PublishContent, PublishError, PublishedPost,
    PublisherAdapter,
};
use crate::config::{ProviderEndpoints, PublishConfig};
use crate::credentials::{sanitize_token, Credential};
use crate::platform::Platform;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

pub struct InstagramPublisher {
    graph_url: String,
    business_id: Option<String>,
    poll_attempts: u32,
    poll_interval: Duration,
    http: reqwest::Client,
}

impl InstagramPublisher {
    pub fn new(endpoints: &ProviderEndpoints, config: &PublishConfig, http: reqwest::Client) -> Self {
        Self {
            graph_url: endpoints.instagram_graph_url.clone(),
            business_id: config.instagram_business_id.clone(),
            poll_attempts: config.instagram_container_poll_attempts,
            poll_interval: Duration::from_millis(config.instagram_container_poll_interval_ms),
            http,
        }
    }

    async fn create_container(&self, ig_user: &str, content: &PublishContent, media: Media<'_>, token: &str) -> Result<String, PublishError> {
        let mut form = vec![("caption", content.caption.as_str()), ("access_token", token)];
        match media {
            Media::Video(url) => {
                form.push(("media_type", "REELS"));
                form.push(("video_url", url));
            }
            Media::Image(url) => form.push(("image_url", url)),
        }

        let response = self
            .http
            .post(format!("{}/{}/media", self.graph_url, ig_user))
            .form(&form)
            .send()
            .await?;
        created_id(&read_api_json(response).await?)
    }

    /// Video containers are processed asynchronously and cannot be published until FINISHED.
    async fn wait_until_ready(&self, container_id: &str, token: &str) -> Result<(), PublishError> {
        for attempt in 1..=self.poll_attempts {
            let response = self
                .http
                .get(format!("{}/{}", self.graph_url, container_id))
                .query(&[("fields", "status_code"), ("access_token", token)])
                .send()
                .await?;
            let body = read_api_json(response).await?;
            let status = body.get("status_code").and_then(Value::as_str).unwrap_or("");

            debug!(container_id = %container_id, attempt, status = %status, "Polled Instagram container");
            match status {
                "FINISHED" => return Ok(()),
                "ERROR" | "EXPIRED" => {
                    return Err(PublishError::ProviderApi {
                        code: None,
                        message: format!("Instagram could not process the video (status {})", status),
                    })
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }

        Err(PublishError::ProviderApi {
            code: None,
            message: format!(
                "Instagram video was still processing after {} checks",
                self.poll_attempts
            ),
        })
    }

    async fn publish_container(&self, ig_user: &str, container_id: &str, token: &str) -> Result<String, PublishError> {
        let response = self
            .http
            .post(format!("{}/{}/media_publish", self.graph_url, ig_user))
            .form(&[("creation_id", container_id), ("access_token", token)])
            .send()
            .await?;
        created_id(&read_api_json(response).await?)
    }

    async fn permalink(&self, media_id: &str, token: &str) -> Option<String> {
        let response = self
            .http
            .get(format!("{}/{}", self.graph_url, media_id))
            .query(&[("fields", "permalink"), ("access_token", token)])
            .send()
            .await
            .ok()?;
        let body = read_api_json(response).await.ok()?;
        body.get("permalink").and_then(Value::as_str).map(str::to_string)
    }
}

#[async_trait]
impl PublisherAdapter for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn validate(&self, content: &PublishContent) -> Result<(), PublishError> {
        match content.media() {
            Some(_) => Ok(()),
            None => Err(PublishError::MissingRequiredMedia(
                "Instagram requires an image or video; text-only posts are not supported".to_string(),
            )),
        }
    }

    async fn publish(&self, content: &PublishContent, credential: &Credential) -> Result<PublishedPost, PublishError> {
        self.validate(content)?;
        let Some(media) = content.media() else {
            return Err(PublishError::MissingRequiredMedia("Instagram requires media".to_string()));
        };

        let ig_user = resolve_publish_target(&credential.identity, self.business_id.as_deref())?.to_string();
        let token = sanitize_token(&credential.access_token);

        let container_id = self.create_container(&ig_user, content, media, &token).await?;
        debug!(container_id = %container_id, "Created Instagram media container");

        if matches!(media, Media::Video(_)) {
            self.wait_until_ready(&container_id, &token).await?;
        }

        let media_id = self.publish_container(&ig_user, &container_id, &token).await?;
        info!(media_id = %media_id, "Published to Instagram");

        let url = self.permalink(&media_id, &token).await;
        Ok(PublishedPost {
            id: Some(media_id),
            url,
        })
    }
}
