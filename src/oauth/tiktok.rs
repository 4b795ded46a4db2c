//! TikTok Login Kit (v2).
//!
//! TikTok calls the client id `client_key` and can report errors inside a
//! 200 response. Token refresh is not wired up yet, so the default
//! `AuthorizationFlow::refresh` (unsupported) applies.

use super::exchange::{
    expires_in, optional_str, read_json, required_str, split_scopes, with_query, ExchangeError,
    TokenGrant,
};
use super::provider::{AuthorizationFlow, ClientCredentials};
use crate::config::ProviderEndpoints;
use crate::credentials::{expiry_from, PlatformIdentity};
use crate::platform::Platform;
use async_trait::async_trait;
use chrono::Utc;

const SCOPES: &[&str] = &["user.info.basic", "video.publish", "video.upload"];

pub struct TiktokFlow {
    client: ClientCredentials,
    endpoints: ProviderEndpoints,
    http: reqwest::Client,
}

impl TiktokFlow {
    pub fn new(client: ClientCredentials, endpoints: ProviderEndpoints, http: reqwest::Client) -> Self {
        Self {
            client,
            endpoints,
            http,
        }
    }
}

#[async_trait]
impl AuthorizationFlow for TiktokFlow {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    fn scopes(&self) -> Vec<String> {
        SCOPES.iter().map(|s| s.to_string()).collect()
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        with_query(
            &self.endpoints.tiktok_auth_url,
            &[
                ("client_key", &self.client.client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", &self.scopes().join(" ")),
                ("state", state),
            ],
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, ExchangeError> {
        let issued_at = Utc::now();
        let response = self
            .http
            .post(&self.endpoints.tiktok_token_url)
            .form(&[
                ("client_key", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = read_json(response).await?;

        if optional_str(&body, "error").is_some() {
            return Err(ExchangeError::Provider {
                status,
                body: body.to_string(),
            });
        }

        Ok(TokenGrant {
            access_token: required_str(&body, "access_token")?,
            refresh_token: optional_str(&body, "refresh_token"),
            expires_at: expiry_from(issued_at, expires_in(&body)),
            granted_scopes: optional_str(&body, "scope")
                .map(|s| split_scopes(&s, ','))
                .unwrap_or_default(),
            identity: PlatformIdentity::Tiktok {
                open_id: optional_str(&body, "open_id"),
            },
        })
    }
}
