//! HTTP API.

pub mod connections;
pub mod error;
pub mod oauth;
pub mod publish;
pub mod scheduled_posts;

pub use connections::create_connections_router;
pub use error::AppError;
pub use oauth::create_oauth_router;
pub use publish::create_publish_router;
pub use scheduled_posts::create_scheduled_posts_router;

use crate::config::AppConfig;
use crate::credentials::CredentialStore;
use crate::oauth::{FlowCatalog, FlowRegistry};
use crate::publish::PublishDispatcher;
use crate::scheduled::ScheduledPostStore;
use crate::tokens::TokenRefreshManager;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for every API router.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub credentials: Arc<CredentialStore>,
    pub catalog: Arc<FlowCatalog>,
    pub flows: FlowRegistry,
    pub tokens: Arc<TokenRefreshManager>,
    pub dispatcher: Arc<PublishDispatcher>,
    pub scheduled: Arc<ScheduledPostStore>,
}

impl AppState {
    /// Wires the OAuth catalog, refresh manager and dispatcher around the
    /// given stores. `http` is shared by every provider call.
    pub fn new(
        config: AppConfig,
        http: reqwest::Client,
        credentials: Arc<CredentialStore>,
        scheduled: Arc<ScheduledPostStore>,
    ) -> Self {
        let config = Arc::new(config);
        let catalog = Arc::new(FlowCatalog::new(Arc::clone(&config), http.clone()));
        let flows = FlowRegistry::new(config.oauth.state_ttl_seconds);
        let tokens = Arc::new(TokenRefreshManager::new(
            Arc::clone(&credentials),
            Arc::clone(&catalog),
        ));
        let dispatcher = Arc::new(PublishDispatcher::new(&config, http, Arc::clone(&tokens)));

        Self {
            config,
            credentials,
            catalog,
            flows,
            tokens,
            dispatcher,
            scheduled,
        }
    }
}

/// Full API router: OAuth, publish, scheduled posts, connections and health.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(create_oauth_router(state.clone()))
        .merge(create_publish_router(state.clone()))
        .merge(create_scheduled_posts_router(state.clone()))
        .merge(create_connections_router(state))
        .layer(cors)
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
