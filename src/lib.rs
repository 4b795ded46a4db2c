// Supported platforms
pub mod platform;

// Environment and file configuration
pub mod config;

// Encrypted credential storage
pub mod credentials;

// OAuth authorization-code flows and pending-flow registry
pub mod oauth;

// Token refresh with single-flight guard
pub mod tokens;

// Publish dispatcher and platform adapters
pub mod publish;

// Pre-publish configuration check
pub mod preflight;

// Scheduled posts
pub mod scheduled;

// HTTP API
pub mod api;

// Acting-user resolution
pub mod auth;
