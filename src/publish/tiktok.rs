//! TikTok publishing is not implemented yet.
//!
//! The adapter exists so TikTok requests get a per-platform `unsupported`
//! result instead of being dropped. It never touches the network.

use super::adapter::{PublishContent, PublishError, PublishedPost, PublisherAdapter};
use crate::credentials::Credential;
use crate::platform::Platform;
use async_trait::async_trait;

const UNSUPPORTED: &str = "Publishing to TikTok is not supported yet";

#[derive(Default)]
pub struct TiktokPublisher;

#[async_trait]
impl PublisherAdapter for TiktokPublisher {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    fn validate(&self, _content: &PublishContent) -> Result<(), PublishError> {
        Err(PublishError::Unsupported(UNSUPPORTED.to_string()))
    }

    async fn publish(&self, _content: &PublishContent, _credential: &Credential) -> Result<PublishedPost, PublishError> {
        Err(PublishError::Unsupported(UNSUPPORTED.to_string()))
    }
}
