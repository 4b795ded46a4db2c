//! Facebook Page publishing. One call per post; the endpoint depends on the media.

use super::adapter::{
    created_id, read_api_json, resolve_publish_target, Media, PublishContent, PublishError, PublishedPost,
    PublisherAdapter,
};
use crate::config::{ProviderEndpoints, PublishConfig};
use crate::credentials::{sanitize_token, Credential};
use crate::oauth::exchange::id_field;
use crate::platform::Platform;
use async_trait::async_trait;
use tracing::info;

pub struct FacebookPublisher {
    graph_url: String,
    page_id: Option<String>,
    http: reqwest::Client,
}

impl FacebookPublisher {
    pub fn new(endpoints: &ProviderEndpoints, config: &PublishConfig, http: reqwest::Client) -> Self {
        Self {
            graph_url: endpoints.facebook_graph_url.clone(),
            page_id: config.facebook_page_id.clone(),
            http,
        }
    }
}

#[async_trait]
impl PublisherAdapter for FacebookPublisher {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn validate(&self, content: &PublishContent) -> Result<(), PublishError> {
        if content.media().is_none() && content.caption.trim().is_empty() {
            return Err(PublishError::MissingRequiredMedia(
                "Facebook posts need a message, an image or a video".to_string(),
            ));
        }
        Ok(())
    }

    async fn publish(&self, content: &PublishContent, credential: &Credential) -> Result<PublishedPost, PublishError> {
        self.validate(content)?;
        let page_id = resolve_publish_target(&credential.identity, self.page_id.as_deref())?;
        let token = sanitize_token(&credential.access_token);

        let (edge, form) = match content.media() {
            Some(Media::Video(url)) => (
                "videos",
                vec![("file_url", url), ("description", content.caption.as_str())],
            ),
            Some(Media::Image(url)) => (
                "photos",
                vec![("url", url), ("caption", content.caption.as_str())],
            ),
            None => ("feed", vec![("message", content.caption.as_str())]),
        };
        let mut form = form;
        form.push(("access_token", token.as_str()));

        let response = self
            .http
            .post(format!("{}/{}/{}", self.graph_url, page_id, edge))
            .form(&form)
            .send()
            .await?;
        let body = read_api_json(response).await?;

        // Photos report the feed story separately from the photo object
        let id = id_field(&body, "post_id").map_or_else(|| created_id(&body), Ok)?;
        info!(page_id = %page_id, edge = %edge, post_id = %id, "Published to Facebook");

        Ok(PublishedPost {
            url: Some(format!("https://www.facebook.com/{}", id)),
            id: Some(id),
        })
    }
}
