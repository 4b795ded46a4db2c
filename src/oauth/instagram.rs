//! Instagram (Instagram API with Instagram Login).

use super::exchange::{
    expires_in, id_field, optional_str, read_json, required_str, split_scopes, with_query,
    ExchangeError, TokenGrant,
};
use super::provider::{AuthorizationFlow, ClientCredentials};
use crate::config::ProviderEndpoints;
use crate::credentials::{expiry_from, PlatformIdentity};
use crate::platform::Platform;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

const SCOPES: &[&str] = &[
    "instagram_business_basic",
    "instagram_business_content_publish",
];

/// Documented lifetime of a short-lived token, used when the long-lived upgrade fails.
const SHORT_LIVED_TOKEN_SECONDS: i64 = 3600;

pub struct InstagramFlow {
    client: ClientCredentials,
    endpoints: ProviderEndpoints,
    http: reqwest::Client,
}

impl InstagramFlow {
    pub fn new(client: ClientCredentials, endpoints: ProviderEndpoints, http: reqwest::Client) -> Self {
        Self {
            client,
            endpoints,
            http,
        }
    }

    /// Swaps a short-lived token for a long-lived (~60 day) one.
    async fn upgrade_to_long_lived(&self, short_lived: &str) -> Result<(String, Option<i64>), ExchangeError> {
        let url = with_query(
            &format!("{}/access_token", self.endpoints.instagram_graph_url),
            &[
                ("grant_type", "ig_exchange_token"),
                ("client_secret", &self.client.client_secret),
                ("access_token", short_lived),
            ],
        );
        let body = read_json(self.http.get(&url).send().await?).await?;
        Ok((required_str(&body, "access_token")?, expires_in(&body)))
    }
}

/// Instagram returns either a flat object or `{ "data": [ {...} ] }`.
fn token_payload(body: &Value) -> &Value {
    body.get("data")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .unwrap_or(body)
}

/// `permissions` arrives as a comma-separated string or as an array.
fn permissions(payload: &Value) -> Vec<String> {
    match payload.get("permissions") {
        Some(Value::String(s)) => split_scopes(s, ','),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl AuthorizationFlow for InstagramFlow {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn scopes(&self) -> Vec<String> {
        SCOPES.iter().map(|s| s.to_string()).collect()
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        with_query(
            &self.endpoints.instagram_auth_url,
            &[
                ("client_id", &self.client.client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", &self.scopes().join(",")),
                ("state", state),
            ],
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, ExchangeError> {
        let issued_at = Utc::now();
        let response = self
            .http
            .post(&self.endpoints.instagram_token_url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
                ("code", code),
            ])
            .send()
            .await?;
        let body = read_json(response).await?;
        let payload = token_payload(&body);

        let short_lived = required_str(payload, "access_token")?;
        let user_id = id_field(payload, "user_id");
        let granted_scopes = permissions(payload);

        let (access_token, expires_at) = match self.upgrade_to_long_lived(&short_lived).await {
            Ok((token, lifetime)) => (token, expiry_from(Utc::now(), lifetime)),
            Err(e) => {
                warn!(error = %e, "Long-lived Instagram token exchange failed, keeping short-lived token");
                (
                    short_lived,
                    expiry_from(issued_at, Some(SHORT_LIVED_TOKEN_SECONDS)),
                )
            }
        };

        debug!(has_user_id = user_id.is_some(), "Instagram token exchange complete");

        Ok(TokenGrant {
            access_token,
            refresh_token: None,
            expires_at,
            granted_scopes,
            identity: PlatformIdentity::Instagram {
                user_id,
                username: None,
            },
        })
    }

    async fn enrich(&self, grant: &mut TokenGrant) -> anyhow::Result<()> {
        let url = with_query(
            &format!("{}/me", self.endpoints.instagram_graph_url),
            &[
                ("fields", "user_id,username"),
                ("access_token", &grant.access_token),
            ],
        );
        let profile = read_json(self.http.get(&url).send().await?)
            .await
            .context("Failed to fetch Instagram profile")?;

        let previous_id = match &grant.identity {
            PlatformIdentity::Instagram { user_id, .. } => user_id.clone(),
            _ => None,
        };
        // `user_id` is the professional account id that publish calls are addressed to.
        grant.identity = PlatformIdentity::Instagram {
            user_id: id_field(&profile, "user_id")
                .or_else(|| id_field(&profile, "id"))
                .or(previous_id),
            username: optional_str(&profile, "username"),
        };
        Ok(())
    }
}
