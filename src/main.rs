use anyhow::{Context, Result};
use postbridge::api::{create_router, AppState};
use postbridge::config::AppConfig;
use postbridge::credentials::CredentialStore;
use postbridge::oauth::run_state_cleanup;
use postbridge::platform::Platform;
use postbridge::scheduled::ScheduledPostStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How often expired OAuth flows are purged.
const STATE_CLEANUP_INTERVAL_SECONDS: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postbridge=info".into()),
        )
        .init();

    info!("Postbridge starting...");

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let encryption_key = config
        .storage
        .encryption_key
        .clone()
        .context("POSTBRIDGE_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    info!(
        bind_addr = %config.server.bind_addr,
        public_url = ?config.server.public_url,
        production = config.server.production,
        credentials_db = %config.storage.credentials_db,
        scheduled_db = %config.storage.scheduled_db,
        "Configuration loaded"
    );

    for platform in Platform::ALL {
        if config.oauth.for_platform(platform).client_credentials().is_none() {
            warn!(
                platform = %platform,
                "OAuth client credentials not configured, connecting this platform will fail with missing_env"
            );
        }
    }

    let credentials = Arc::new(
        CredentialStore::new(&config.storage.credentials_db, &encryption_key)
            .context("Failed to initialize credential store")?,
    );
    info!("Credential store initialized");

    let scheduled = Arc::new(
        ScheduledPostStore::new(&config.storage.scheduled_db)
            .context("Failed to initialize scheduled post store")?,
    );
    info!("Scheduled post store initialized");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("Failed to build HTTP client")?;

    let bind_addr = config.server.bind_addr.clone();
    let state = AppState::new(config, http, credentials, scheduled);

    let cleanup_handle = tokio::spawn(run_state_cleanup(
        state.flows.clone(),
        STATE_CLEANUP_INTERVAL_SECONDS,
    ));

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(bind_addr = %bind_addr, "HTTP API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    cleanup_handle.abort();
    info!("Postbridge stopped");

    Ok(())
}
