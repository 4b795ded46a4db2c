//! YouTube via Google OAuth 2.0.

use super::exchange::{
    expires_in, optional_str, read_json, required_str, split_scopes, with_query, ExchangeError,
    RefreshError, RefreshedToken, TokenGrant,
};
use super::provider::{AuthorizationFlow, ClientCredentials};
use crate::config::{ProviderEndpoints, YoutubeAuthOverrides};
use crate::credentials::{expiry_from, PlatformIdentity};
use crate::platform::Platform;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::debug;

const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube.readonly",
];

pub struct YoutubeFlow {
    client: ClientCredentials,
    endpoints: ProviderEndpoints,
    http: reqwest::Client,
    overrides: YoutubeAuthOverrides,
}

impl YoutubeFlow {
    pub fn new(
        client: ClientCredentials,
        endpoints: ProviderEndpoints,
        http: reqwest::Client,
        overrides: YoutubeAuthOverrides,
    ) -> Self {
        Self {
            client,
            endpoints,
            http,
            overrides,
        }
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<Value, ExchangeError> {
        let response = self
            .http
            .post(&self.endpoints.google_token_url)
            .form(form)
            .send()
            .await?;
        read_json(response).await
    }
}

#[async_trait]
impl AuthorizationFlow for YoutubeFlow {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    fn scopes(&self) -> Vec<String> {
        match &self.overrides.scopes {
            Some(scopes) if !scopes.is_empty() => scopes.clone(),
            _ => DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        // offline + consent so Google issues a refresh token on every connect
        let access_type = self.overrides.access_type.as_deref().unwrap_or("offline");
        let prompt = self.overrides.prompt.as_deref().unwrap_or("consent");
        with_query(
            &self.endpoints.google_auth_url,
            &[
                ("client_id", &self.client.client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", &self.scopes().join(" ")),
                ("access_type", access_type),
                ("prompt", prompt),
                ("include_granted_scopes", "true"),
                ("state", state),
            ],
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, ExchangeError> {
        let issued_at = Utc::now();
        let body = self
            .post_token_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.client.client_id),
                ("client_secret", &self.client.client_secret),
                ("redirect_uri", redirect_uri),
            ])
            .await?;

        Ok(TokenGrant {
            access_token: required_str(&body, "access_token")?,
            refresh_token: optional_str(&body, "refresh_token"),
            expires_at: expiry_from(issued_at, expires_in(&body)),
            granted_scopes: optional_str(&body, "scope")
                .map(|s| split_scopes(&s, ' '))
                .unwrap_or_default(),
            identity: PlatformIdentity::unknown(Platform::Youtube),
        })
    }

    async fn enrich(&self, grant: &mut TokenGrant) -> anyhow::Result<()> {
        let url = with_query(
            &format!("{}/channels", self.endpoints.youtube_api_url),
            &[("part", "snippet"), ("mine", "true")],
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&grant.access_token)
            .send()
            .await
            .context("Failed to reach YouTube channels endpoint")?;
        let body = read_json(response)
            .await
            .context("Failed to fetch YouTube channel")?;

        let channel = body
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first());

        match channel {
            Some(channel) => {
                grant.identity = PlatformIdentity::Youtube {
                    channel_id: optional_str(channel, "id"),
                    channel_title: channel
                        .get("snippet")
                        .and_then(|s| optional_str(s, "title")),
                };
            }
            None => debug!("Authorized Google account has no YouTube channel"),
        }
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, RefreshError> {
        let issued_at = Utc::now();
        let response = self
            .http
            .post(&self.endpoints.google_token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client.client_id),
                ("client_secret", &self.client.client_secret),
            ])
            .send()
            .await
            .map_err(|e| RefreshError::Transient(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RefreshError::Transient(e.to_string()))?;
        if !status.is_success() {
            return Err(RefreshError::classify(status.as_u16(), &body));
        }

        let json: Value = serde_json::from_str(&body)
            .map_err(|e| RefreshError::Transient(format!("invalid JSON ({}): {}", e, body)))?;
        let access_token = required_str(&json, "access_token")
            .map_err(|e| RefreshError::Transient(e.to_string()))?;

        Ok(RefreshedToken {
            access_token,
            refresh_token: optional_str(&json, "refresh_token"),
            expires_at: expiry_from(issued_at, expires_in(&json)),
        })
    }
}
