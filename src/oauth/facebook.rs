//! Facebook Login for Pages.
//!
//! The token endpoint is the legacy GET form. After the code exchange the user
//! token is upgraded to a long-lived one, and enrichment swaps it for the
//! access token of the page that posts will be published to.

use super::exchange::{
    expires_in, id_field, optional_str, read_json, required_str, with_query, ExchangeError,
    TokenGrant,
};
use super::provider::{AuthorizationFlow, ClientCredentials};
use crate::config::ProviderEndpoints;
use crate::credentials::{expiry_from, PlatformIdentity};
use crate::platform::Platform;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

const SCOPES: &[&str] = &[
    "public_profile",
    "pages_show_list",
    "pages_read_engagement",
    "pages_manage_posts",
];

pub struct FacebookFlow {
    client: ClientCredentials,
    endpoints: ProviderEndpoints,
    http: reqwest::Client,
    preferred_page_id: Option<String>,
}

/// A page the user manages, as listed by `/me/accounts`.
#[derive(Debug, Clone, PartialEq)]
struct ManagedPage {
    id: String,
    name: Option<String>,
    access_token: Option<String>,
}

impl FacebookFlow {
    pub fn new(
        client: ClientCredentials,
        endpoints: ProviderEndpoints,
        http: reqwest::Client,
        preferred_page_id: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoints,
            http,
            preferred_page_id,
        }
    }

    async fn graph_get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, ExchangeError> {
        let url = with_query(&format!("{}/{}", self.endpoints.facebook_graph_url, path), params);
        read_json(self.http.get(&url).send().await?).await
    }

    async fn fetch_user_id(&self, token: &str) -> anyhow::Result<Option<String>> {
        let me = self
            .graph_get("me", &[("fields", "id,name"), ("access_token", token)])
            .await
            .context("Failed to fetch Facebook profile")?;
        Ok(id_field(&me, "id"))
    }

    async fn fetch_granted_permissions(&self, token: &str) -> anyhow::Result<Vec<String>> {
        let body = self
            .graph_get("me/permissions", &[("access_token", token)])
            .await
            .context("Failed to fetch Facebook permissions")?;
        Ok(granted_permissions(&body))
    }

    async fn fetch_pages(&self, token: &str) -> anyhow::Result<Vec<ManagedPage>> {
        let body = self
            .graph_get(
                "me/accounts",
                &[("fields", "id,name,access_token"), ("access_token", token)],
            )
            .await
            .context("Failed to fetch Facebook pages")?;
        Ok(managed_pages(&body))
    }
}

/// Permissions with `status == "granted"`, in the order the Graph API lists them.
fn granted_permissions(body: &Value) -> Vec<String> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|p| p.get("status").and_then(Value::as_str) == Some("granted"))
                .filter_map(|p| optional_str(p, "permission"))
                .collect()
        })
        .unwrap_or_default()
}

fn managed_pages(body: &Value) -> Vec<ManagedPage> {
    body.get("data")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|p| {
                    Some(ManagedPage {
                        id: id_field(p, "id")?,
                        name: optional_str(p, "name"),
                        access_token: optional_str(p, "access_token"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// The configured page if the user manages it, otherwise the first page.
fn choose_page(pages: Vec<ManagedPage>, preferred: Option<&str>) -> Option<ManagedPage> {
    if let Some(preferred) = preferred {
        if let Some(page) = pages.iter().find(|p| p.id == preferred) {
            return Some(page.clone());
        }
    }
    pages.into_iter().next()
}

#[async_trait]
impl AuthorizationFlow for FacebookFlow {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn scopes(&self) -> Vec<String> {
        SCOPES.iter().map(|s| s.to_string()).collect()
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        with_query(
            &self.endpoints.facebook_auth_url,
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
        let body = self
            .graph_get(
                "oauth/access_token",
                &[
                    ("client_id", &self.client.client_id),
                    ("redirect_uri", redirect_uri),
                    ("client_secret", &self.client.client_secret),
                    ("code", code),
                ],
            )
            .await?;
        let short_lived = required_str(&body, "access_token")?;
        let short_expiry = expiry_from(issued_at, expires_in(&body));

        let upgraded = self
            .graph_get(
                "oauth/access_token",
                &[
                    ("grant_type", "fb_exchange_token"),
                    ("client_id", &self.client.client_id),
                    ("client_secret", &self.client.client_secret),
                    ("fb_exchange_token", &short_lived),
                ],
            )
            .await;

        let (access_token, expires_at) = match upgraded {
            Ok(body) => match required_str(&body, "access_token") {
                Ok(token) => (token, expiry_from(Utc::now(), expires_in(&body))),
                Err(e) => {
                    warn!(error = %e, "Long-lived Facebook token response malformed");
                    (short_lived, short_expiry)
                }
            },
            Err(e) => {
                warn!(error = %e, "Long-lived Facebook token exchange failed, keeping short-lived token");
                (short_lived, short_expiry)
            }
        };

        Ok(TokenGrant {
            access_token,
            refresh_token: None,
            expires_at,
            granted_scopes: Vec::new(),
            identity: PlatformIdentity::unknown(Platform::Facebook),
        })
    }

    async fn enrich(&self, grant: &mut TokenGrant) -> anyhow::Result<()> {
        let user_token = grant.access_token.clone();
        let mut failures = Vec::new();

        let user_id = match self.fetch_user_id(&user_token).await {
            Ok(id) => id,
            Err(e) => {
                failures.push(e.to_string());
                None
            }
        };

        match self.fetch_granted_permissions(&user_token).await {
            Ok(scopes) => grant.granted_scopes = scopes,
            Err(e) => failures.push(e.to_string()),
        }

        let page = match self.fetch_pages(&user_token).await {
            Ok(pages) => {
                debug!(page_count = pages.len(), "Fetched Facebook pages");
                choose_page(pages, self.preferred_page_id.as_deref())
            }
            Err(e) => {
                failures.push(e.to_string());
                None
            }
        };

        let (page_id, page_name) = match page {
            Some(page) => {
                // Page tokens derived from a long-lived user token do not expire.
                if let Some(page_token) = page.access_token {
                    grant.access_token = page_token;
                    grant.expires_at = None;
                }
                (Some(page.id), page.name)
            }
            None => (None, None),
        };

        grant.identity = PlatformIdentity::Facebook {
            user_id,
            page_id,
            page_name,
        };

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(failures.join("; ")))
        }
    }
}
