//! Lazy access-token refresh.
//!
//! Tokens are refreshed inline when a caller asks for one that is missing an
//! expiry or expires within [`REFRESH_WINDOW_SECONDS`]. Concurrent callers for the
//! same (user, platform) share a single refresh.

use crate::credentials::{Credential, CredentialStore};
use crate::oauth::{FlowCatalog, RefreshError};
use crate::platform::Platform;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Look-ahead before expiry at which a token is renewed.
pub const REFRESH_WINDOW_SECONDS: i64 = 300;

/// Whether a token with this expiry is due for refresh at `now`.
///
/// Missing expiry counts as due. Otherwise due when it expires strictly before
/// `now + 5 minutes`.
pub fn should_refresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expires_at) => expires_at < now + Duration::seconds(REFRESH_WINDOW_SECONDS),
        None => true,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("No access token stored for {0}")]
    NoToken(Platform),

    #[error("{0} token expired and no refresh token is available; reconnect the account")]
    NoRefreshTokenAvailable(Platform),

    #[error("{0} refresh token expired or was revoked; reconnect the account")]
    RefreshTokenExpired(Platform),

    #[error("Token refresh is not supported for {0}")]
    RefreshUnsupported(Platform),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Credential storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl TokenError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::NoToken(_) => "NO_TOKEN",
            TokenError::NoRefreshTokenAvailable(_) => "NO_REFRESH_TOKEN_AVAILABLE",
            TokenError::RefreshTokenExpired(_) => "REFRESH_TOKEN_EXPIRED",
            TokenError::RefreshUnsupported(_) => "REFRESH_UNSUPPORTED",
            TokenError::RefreshFailed(_) => "REFRESH_FAILED",
            TokenError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// True when only a new OAuth connect can fix this.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            TokenError::NoToken(_)
                | TokenError::NoRefreshTokenAvailable(_)
                | TokenError::RefreshTokenExpired(_)
        )
    }
}

/// A credential that is safe to use right now.
#[derive(Clone, Debug)]
pub struct ValidToken {
    pub credential: Credential,
    /// True when this call performed a refresh
    pub refreshed: bool,
}

pub struct TokenRefreshManager {
    store: Arc<CredentialStore>,
    catalog: Arc<FlowCatalog>,
    locks: DashMap<(String, Platform), Arc<Mutex<()>>>,
}

impl TokenRefreshManager {
    pub fn new(store: Arc<CredentialStore>, catalog: Arc<FlowCatalog>) -> Self {
        Self {
            store,
            catalog,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, user_id: &str, platform: Platform) -> Arc<Mutex<()>> {
        self.locks
            .entry((user_id.to_string(), platform))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn load(&self, user_id: &str, platform: Platform) -> Result<Credential, TokenError> {
        self.store
            .get(user_id, platform)?
            .ok_or(TokenError::NoToken(platform))
    }

    /// Returns a usable credential for (user, platform), refreshing it first if due.
    pub async fn get_valid_token(&self, user_id: &str, platform: Platform) -> Result<ValidToken, TokenError> {
        let credential = self.load(user_id, platform)?;
        if let Some(valid) = self.without_refresh(credential, Utc::now())? {
            return Ok(valid);
        }

        let lock = self.lock_for(user_id, platform);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited
        let credential = self.load(user_id, platform)?;
        let now = Utc::now();
        if let Some(valid) = self.without_refresh(credential.clone(), now)? {
            return Ok(valid);
        }

        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Err(TokenError::NoRefreshTokenAvailable(platform));
        };
        let Some(flow) = self.catalog.flow(platform) else {
            return Err(TokenError::RefreshFailed(format!(
                "{} client credentials are not configured",
                platform.display_name()
            )));
        };

        debug!(platform = %platform, user_id = %user_id, "Refreshing access token");

        match flow.refresh(&refresh_token).await {
            Ok(refreshed) => {
                // Providers that do not rotate refresh tokens omit them from the response
                let refresh_token = refreshed.refresh_token.unwrap_or(refresh_token);
                self.store.update_tokens(
                    user_id,
                    platform,
                    &refreshed.access_token,
                    Some(&refresh_token),
                    refreshed.expires_at,
                )?;

                info!(
                    platform = %platform,
                    user_id = %user_id,
                    expires_at = ?refreshed.expires_at,
                    "Access token refreshed"
                );

                Ok(ValidToken {
                    credential: Credential {
                        access_token: refreshed.access_token,
                        refresh_token: Some(refresh_token),
                        expires_at: refreshed.expires_at,
                        ..credential
                    },
                    refreshed: true,
                })
            }
            Err(RefreshError::Revoked(body)) => {
                warn!(
                    platform = %platform,
                    user_id = %user_id,
                    provider_error = %body,
                    "Refresh token revoked, clearing stored tokens"
                );
                self.store.clear_tokens(user_id, platform)?;
                Err(TokenError::RefreshTokenExpired(platform))
            }
            Err(RefreshError::Unsupported) if !credential.is_expired_at(now) => {
                debug!(platform = %platform, "Refresh unsupported, using token until it expires");
                Ok(ValidToken {
                    credential,
                    refreshed: false,
                })
            }
            Err(RefreshError::Unsupported) => Err(TokenError::RefreshUnsupported(platform)),
            Err(RefreshError::Transient(message)) => {
                warn!(platform = %platform, user_id = %user_id, error = %message, "Token refresh failed");
                Err(TokenError::RefreshFailed(message))
            }
        }
    }

    /// `Some` when the credential can be returned without a refresh.
    fn without_refresh(&self, credential: Credential, now: DateTime<Utc>) -> Result<Option<ValidToken>, TokenError> {
        if !should_refresh(credential.expires_at, now) {
            return Ok(Some(ValidToken {
                credential,
                refreshed: false,
            }));
        }
        match (&credential.refresh_token, credential.expires_at) {
            // No expiry and nothing to refresh with: the provider issued a non-expiring token
            (None, None) => Ok(Some(ValidToken {
                credential,
                refreshed: false,
            })),
            (None, Some(_)) => Err(TokenError::NoRefreshTokenAvailable(credential.platform())),
            (Some(_), _) => Ok(None),
        }
    }
}
