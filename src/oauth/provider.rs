//! Per-platform authorization-code flows behind one interface.

use super::exchange::{ExchangeError, RefreshError, RefreshedToken, TokenGrant};
use super::{facebook::FacebookFlow, instagram::InstagramFlow, tiktok::TiktokFlow, youtube::YoutubeFlow};
use crate::config::AppConfig;
use crate::platform::Platform;
use async_trait::async_trait;
use std::sync::Arc;

/// OAuth app registration for one platform.
#[derive(Clone, Debug)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Authorization-code grant for one platform.
///
/// Implementations differ in parameter names, scope separators and token
/// endpoint encoding; callers only see this shape.
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    fn platform(&self) -> Platform;

    /// Scopes requested at authorization time.
    fn scopes(&self) -> Vec<String>;

    /// Provider authorization page URL for this flow.
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String;

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, ExchangeError>;

    /// Fills in identity fields (and for some platforms scopes or a narrower token).
    ///
    /// Failure must not fail the flow; callers log it and keep the grant as is.
    async fn enrich(&self, _grant: &mut TokenGrant) -> anyhow::Result<()> {
        Ok(())
    }

    /// Obtains a new access token from a refresh token.
    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedToken, RefreshError> {
        Err(RefreshError::Unsupported)
    }
}

/// Builds flows from configuration, sharing one HTTP client.
pub struct FlowCatalog {
    config: Arc<AppConfig>,
    http: reqwest::Client,
}

impl FlowCatalog {
    pub fn new(config: Arc<AppConfig>, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Returns the flow for `platform`, or `None` when its client id or secret is not configured.
    pub fn flow(&self, platform: Platform) -> Option<Box<dyn AuthorizationFlow>> {
        let (client_id, client_secret) = self.config.oauth.for_platform(platform).client_credentials()?;
        let client = ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        };
        let endpoints = self.config.endpoints.clone();
        let http = self.http.clone();

        let flow: Box<dyn AuthorizationFlow> = match platform {
            Platform::Instagram => Box::new(InstagramFlow::new(client, endpoints, http)),
            Platform::Facebook => Box::new(FacebookFlow::new(
                client,
                endpoints,
                http,
                self.config.publish.facebook_page_id.clone(),
            )),
            Platform::Youtube => Box::new(YoutubeFlow::new(
                client,
                endpoints,
                http,
                self.config.oauth.youtube_overrides.clone(),
            )),
            Platform::Tiktok => Box::new(TiktokFlow::new(client, endpoints, http)),
        };
        Some(flow)
    }

    /// Redirect URI for `platform`: the configured override, else `<origin>/api/<platform>/callback`.
    pub fn redirect_uri(&self, platform: Platform, origin: &str) -> String {
        match &self.config.oauth.for_platform(platform).redirect_uri {
            Some(uri) => uri.clone(),
            None => format!("{}/api/{}/callback", origin.trim_end_matches('/'), platform),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformOAuthConfig;

    fn catalog_with(platform: Platform, redirect_uri: Option<&str>) -> FlowCatalog {
        let mut config = AppConfig::default();
        let entry = PlatformOAuthConfig {
            client_id: Some("cid".to_string()),
            client_secret: Some("secret".to_string()),
            redirect_uri: redirect_uri.map(str::to_string),
        };
        match platform {
            Platform::Instagram => config.oauth.instagram = entry,
            Platform::Facebook => config.oauth.facebook = entry,
            Platform::Youtube => config.oauth.youtube = entry,
            Platform::Tiktok => config.oauth.tiktok = entry,
        }
        FlowCatalog::new(Arc::new(config), reqwest::Client::new())
    }

    #[test]
    fn test_flow_requires_client_credentials() {
        let catalog = FlowCatalog::new(Arc::new(AppConfig::default()), reqwest::Client::new());
        for platform in Platform::ALL {
            assert!(catalog.flow(platform).is_none());
        }

        let catalog = catalog_with(Platform::Youtube, None);
        assert_eq!(catalog.flow(Platform::Youtube).unwrap().platform(), Platform::Youtube);
        assert!(catalog.flow(Platform::Facebook).is_none());
    }

    #[test]
    fn test_redirect_uri_defaults_to_same_origin() {
        let catalog = catalog_with(Platform::Tiktok, None);
        assert_eq!(
            catalog.redirect_uri(Platform::Tiktok, "https://app.example.com/"),
            "https://app.example.com/api/tiktok/callback"
        );
    }

    #[test]
    fn test_redirect_uri_override() {
        let catalog = catalog_with(Platform::Instagram, Some("https://tunnel.example/ig/cb"));
        assert_eq!(
            catalog.redirect_uri(Platform::Instagram, "http://localhost:3000"),
            "https://tunnel.example/ig/cb"
        );
    }
}
