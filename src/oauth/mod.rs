//! OAuth 2.0 authorization-code flows for the supported platforms.
//!
//! Flow per platform:
//! 1. UI opens a popup on GET /api/:platform/login
//! 2. Redirect to the provider with a fresh `state` (also set as a cookie)
//! 3. User authorizes on the provider's site
//! 4. Provider redirects to /api/:platform/callback
//! 5. State is checked, code exchanged, identity fetched, credential stored
//! 6. The popup posts the outcome to its opener and closes

pub mod exchange;
pub mod facebook;
pub mod instagram;
pub mod provider;
pub mod state_manager;
pub mod tiktok;
pub mod youtube;

pub use exchange::{ExchangeError, RefreshError, RefreshedToken, TokenGrant};
pub use provider::{AuthorizationFlow, ClientCredentials, FlowCatalog};
pub use state_manager::{
    generate_state, run_state_cleanup, states_match, FlowOutcome, FlowRegistry, OAuthError, PendingFlow,
    WaitError,
};
