//! OAuth HTTP endpoints.
//!
//! - `GET /api/:platform/login` starts a flow and redirects to the provider
//! - `GET /api/:platform/callback` finishes it and answers with the popup page
//! - `GET /api/:platform/wait` long-polls for the outcome of a flow
//!
//! Every failure after `login` ends in the popup page, never a JSON error, so
//! the popup always closes and the opener always hears back.

pub mod popup;

use super::{AppError, AppState};
use crate::auth::resolve_user_id;
use crate::config::AppConfig;
use crate::oauth::{
    generate_state, states_match, ExchangeError, FlowOutcome, OAuthError, PendingFlow, TokenGrant,
    WaitError,
};
use crate::platform::Platform;
use axum::{
    extract::{Path, Query, State},
    http::{
        header::{HOST, LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use popup::{clear_flow_cookies, flow_cookie, popup_page, read_cookie};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

/// Longest widget id accepted into a cookie.
const MAX_WIDGET_ID_LEN: usize = 128;

/// Query parameters for the login endpoint
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoginQuery {
    widget_id: Option<String>,
    user_id: Option<String>,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitQuery {
    widget_id: Option<String>,
    state: Option<String>,
    user_id: Option<String>,
}

/// Create OAuth API router
pub fn create_oauth_router(state: AppState) -> Router {
    Router::new()
        .route("/api/:platform/login", get(login))
        .route("/api/:platform/callback", get(callback))
        .route("/api/:platform/wait", get(wait))
        .with_state(state)
}

pub(crate) fn parse_platform(name: &str) -> Result<Platform, AppError> {
    name.parse()
        .map_err(|_| AppError::NotFound(format!("Platform '{}' not found", name)))
}

/// Origin of the app as the browser sees it: configured public URL, else
/// `X-Forwarded-Proto` / `X-Forwarded-Host` / `Host`.
pub fn request_origin(config: &AppConfig, headers: &HeaderMap) -> String {
    if let Some(public_url) = &config.server.public_url {
        return public_url.trim_end_matches('/').to_string();
    }
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let default_scheme = if config.server.production { "https" } else { "http" };
    let scheme = header("x-forwarded-proto").unwrap_or(default_scheme);
    let host = header("x-forwarded-host")
        .or_else(|| header(HOST.as_str()))
        .unwrap_or("localhost");
    format!("{}://{}", scheme, host)
}

/// Widget ids end up in a cookie, so only plain identifier characters pass.
fn sanitize_widget_id(raw: Option<String>) -> Option<String> {
    raw.map(|w| w.trim().to_string()).filter(|w| {
        !w.is_empty()
            && w.len() <= MAX_WIDGET_ID_LEN
            && w.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    })
}

fn append_cookie(response: &mut Response, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
}

/// GET /api/:platform/login
///
/// Redirects to the provider's authorization page with a fresh CSRF state.
/// Missing client credentials end the flow immediately with `missing_env`.
async fn login(
    State(state): State<AppState>,
    Path(platform_name): Path<String>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let platform = parse_platform(&platform_name)?;
    let origin = request_origin(&state.config, &headers);

    let Some(flow) = state.catalog.flow(platform) else {
        warn!(
            platform = %platform,
            "OAuth client credentials not configured (set POSTBRIDGE_OAUTH_{}_CLIENT_ID and _CLIENT_SECRET)",
            platform.env_prefix()
        );
        let outcome = FlowOutcome::from_error(platform, &OAuthError::MissingEnv);
        return Ok(popup_page(&outcome, &origin).into_response());
    };

    let user_id = resolve_user_id(query.user_id.as_deref(), &headers);
    let widget_id = sanitize_widget_id(query.widget_id);
    let csrf_state = generate_state();
    let redirect_uri = state.catalog.redirect_uri(platform, &origin);
    let auth_url = flow.authorization_url(&csrf_state, &redirect_uri);

    state.flows.register(
        &csrf_state,
        PendingFlow {
            platform,
            user_id: user_id.clone(),
            widget_id: widget_id.clone(),
            created_at: Utc::now(),
        },
    );

    let location = HeaderValue::from_str(&auth_url)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid authorization URL: {}", e)))?;
    let mut response = (StatusCode::FOUND, [(LOCATION, location)]).into_response();

    let secure = state.config.server.production;
    let ttl = state.config.oauth.state_ttl_seconds;
    append_cookie(&mut response, &flow_cookie(&platform.state_cookie(), &csrf_state, ttl, secure));
    if let Some(widget_id) = &widget_id {
        append_cookie(&mut response, &flow_cookie(&platform.widget_cookie(), widget_id, ttl, secure));
    }

    info!(
        platform = %platform,
        user_id = %user_id,
        widget_id = ?widget_id,
        "Redirecting to OAuth provider"
    );
    Ok(response)
}

/// GET /api/:platform/callback
///
/// Validates state, exchanges the code, stores the credential and reports the
/// outcome to the opener. Both flow cookies are cleared whatever happens.
async fn callback(
    State(state): State<AppState>,
    Path(platform_name): Path<String>,
    Query(params): Query<OAuthCallback>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let platform = parse_platform(&platform_name)?;
    let origin = request_origin(&state.config, &headers);
    let cookie_state = read_cookie(&headers, &platform.state_cookie());

    // Only a state confirmed by the cookie may resolve a pending flow
    let verified_state = states_match(params.state.as_deref(), cookie_state.as_deref())
        .then(|| params.state.clone())
        .flatten();

    let outcome = match complete_flow(&state, platform, params, verified_state.as_deref(), &origin).await {
        Ok(data) => FlowOutcome::success(platform, data),
        Err(e) => {
            if e == OAuthError::InvalidState {
                warn!(platform = %platform, "OAuth state missing, mismatched, expired or already used");
            }
            FlowOutcome::from_error(platform, &e)
        }
    };

    if let Some(verified) = &verified_state {
        state.flows.complete(verified, outcome.clone());
    }

    let mut response = popup_page(&outcome, &origin).into_response();
    for cookie in clear_flow_cookies(platform, state.config.server.production) {
        append_cookie(&mut response, &cookie);
    }
    Ok(response)
}

async fn complete_flow(
    state: &AppState,
    platform: Platform,
    params: OAuthCallback,
    verified_state: Option<&str>,
    origin: &str,
) -> Result<Value, OAuthError> {
    if let Some(reason) = params.error {
        warn!(
            platform = %platform,
            error = %reason,
            description = ?params.error_description,
            "OAuth authorization failed"
        );
        return Err(OAuthError::ProviderDenied {
            reason,
            description: params.error_description,
        });
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(OAuthError::MissingCode)?;

    // State is checked before any network call
    let csrf_state = verified_state.ok_or(OAuthError::InvalidState)?;
    let pending = state
        .flows
        .consume(csrf_state)
        .filter(|p| p.platform == platform)
        .ok_or(OAuthError::InvalidState)?;

    let flow = state.catalog.flow(platform).ok_or(OAuthError::MissingEnv)?;
    let redirect_uri = state.catalog.redirect_uri(platform, origin);

    debug!(platform = %platform, "Exchanging authorization code for token");
    let mut grant = flow.exchange_code(&code, &redirect_uri).await.map_err(|e| {
        error!(platform = %platform, error = %e, "Token exchange failed");
        match e {
            ExchangeError::Provider { body, .. } => OAuthError::TokenError(body),
            other => OAuthError::TokenError(other.to_string()),
        }
    })?;

    if let Err(e) = flow.enrich(&mut grant).await {
        warn!(platform = %platform, error = %format!("{:#}", e), "Account enrichment failed, continuing without it");
    }

    let data = flow_data(platform, &grant);
    let credential = grant.into_credential();
    state
        .credentials
        .store(&pending.user_id, &credential)
        .map_err(|e| {
            error!(platform = %platform, user_id = %pending.user_id, error = %format!("{:#}", e), "Failed to store credentials");
            OAuthError::Storage
        })?;

    info!(
        platform = %platform,
        user_id = %pending.user_id,
        has_refresh_token = credential.refresh_token.is_some(),
        expires_at = ?credential.expires_at,
        "OAuth flow completed successfully"
    );
    Ok(data)
}

/// Popup payload for a successful connect. Never includes tokens.
fn flow_data(platform: Platform, grant: &TokenGrant) -> Value {
    json!({
        "platform": platform,
        "displayName": grant.identity.display_name(),
        "identity": grant.identity,
        "grantedScopes": grant.granted_scopes,
        "expiresAt": grant.expires_at,
    })
}

/// GET /api/:platform/wait?widgetId=&userId= (or ?state=)
///
/// Resolves with the same message the popup posts once the callback runs.
/// A widget lookup only matches flows the acting user started.
async fn wait(
    State(state): State<AppState>,
    Path(platform_name): Path<String>,
    Query(query): Query<WaitQuery>,
    headers: HeaderMap,
) -> Result<Json<FlowOutcome>, AppError> {
    let platform = parse_platform(&platform_name)?;

    let csrf_state = match (query.state, query.widget_id) {
        (Some(s), _) if !s.is_empty() => s,
        (_, Some(widget_id)) => state
            .flows
            .state_for_widget(
                platform,
                &resolve_user_id(query.user_id.as_deref(), &headers),
                &widget_id,
            )
            .ok_or_else(|| AppError::NotFound("No pending OAuth flow for this widget".to_string()))?,
        _ => {
            return Err(AppError::BadRequest(
                "widgetId or state is required".to_string(),
            ))
        }
    };

    match state.flows.await_completion(&csrf_state).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e @ WaitError::UnknownFlow) => Err(AppError::NotFound(e.to_string())),
        Err(e @ WaitError::TimedOut) => Err(AppError::GatewayTimeout(e.to_string())),
    }
}
