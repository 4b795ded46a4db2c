//! OAuth state management for CSRF protection and flow completion.
//!
//! The `state` value travels two ways: in a short-lived cookie set on the
//! login response, and through the provider redirect. The callback accepts the
//! flow only if both copies are present and identical. Each login also
//! registers a pending flow so a caller can await its outcome, keyed by
//! `state` or by the originating widget id.

use crate::platform::Platform;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Length of generated state tokens.
pub const STATE_LENGTH: usize = 32;

/// Generates an unpredictable alphanumeric state token.
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LENGTH)
        .map(char::from)
        .collect()
}

/// CSRF check: both values present, non-empty and exactly equal.
///
/// Compares every byte regardless of where the first difference is.
pub fn states_match(query_state: Option<&str>, cookie_state: Option<&str>) -> bool {
    match (query_state, cookie_state) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            let (a, b) = (a.as_bytes(), b.as_bytes());
            if a.len() != b.len() {
                return false;
            }
            a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
        }
        _ => false,
    }
}

/// A login that has redirected to the provider and not yet called back.
#[derive(Clone, Debug)]
pub struct PendingFlow {
    pub platform: Platform,
    pub user_id: String,
    pub widget_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Terminal result of a flow, identical to what the popup posts to its opener.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowOutcome {
    pub source: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlowOutcome {
    pub fn success(platform: Platform, data: Value) -> Self {
        Self {
            source: platform.message_source(),
            ok: true,
            data: Some(data),
            reason: None,
            error: None,
        }
    }

    pub fn failure(platform: Platform, reason: impl Into<String>, error: Option<String>) -> Self {
        Self {
            source: platform.message_source(),
            ok: false,
            data: None,
            reason: Some(reason.into()),
            error,
        }
    }

    pub fn from_error(platform: Platform, err: &OAuthError) -> Self {
        Self::failure(platform, err.reason(), err.detail())
    }
}

/// Why a flow ended without a stored credential.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OAuthError {
    #[error("OAuth client credentials are not configured")]
    MissingEnv,

    /// The provider redirected back with `error=...`
    #[error("Authorization denied by provider: {reason}")]
    ProviderDenied {
        reason: String,
        description: Option<String>,
    },

    #[error("Callback did not include an authorization code")]
    MissingCode,

    #[error("OAuth state is missing, mismatched, expired, or already used")]
    InvalidState,

    /// Token exchange failed; carries the provider's raw response
    #[error("Token exchange failed")]
    TokenError(String),

    #[error("Failed to store credentials")]
    Storage,
}

impl OAuthError {
    /// `reason` field posted to the opener.
    pub fn reason(&self) -> &str {
        match self {
            OAuthError::MissingEnv => "missing_env",
            OAuthError::ProviderDenied { reason, .. } => reason,
            OAuthError::MissingCode => "missing_code",
            OAuthError::InvalidState => "invalid_state",
            OAuthError::TokenError(_) => "token_error",
            OAuthError::Storage => "storage_error",
        }
    }

    /// `error` detail posted to the opener, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            OAuthError::ProviderDenied { description, .. } => description.clone(),
            OAuthError::TokenError(raw) => Some(raw.clone()),
            _ => None,
        }
    }
}

/// Why awaiting a flow produced no outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("No pending OAuth flow found")]
    UnknownFlow,

    #[error("OAuth flow did not complete before its state expired")]
    TimedOut,
}

struct FlowSlot {
    flow: PendingFlow,
    consumed: bool,
    completion: watch::Sender<Option<FlowOutcome>>,
}

/// In-memory registry of pending flows with automatic expiration.
#[derive(Clone)]
pub struct FlowRegistry {
    flows: Arc<DashMap<String, FlowSlot>>,
    ttl: Duration,
}

impl FlowRegistry {
    /// Create a registry whose entries live for `ttl_seconds` (600 matches the state cookie).
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            flows: Arc::new(DashMap::new()),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, flow: &PendingFlow, now: DateTime<Utc>) -> bool {
        now - flow.created_at >= self.ttl
    }

    /// Record a flow under its state token.
    pub fn register(&self, state: &str, flow: PendingFlow) {
        let (completion, _) = watch::channel(None);
        self.flows.insert(
            state.to_string(),
            FlowSlot {
                flow,
                consumed: false,
                completion,
            },
        );
    }

    /// Claim a pending flow for its callback. Single use: a second call returns `None`.
    pub fn consume(&self, state: &str) -> Option<PendingFlow> {
        let now = Utc::now();
        let mut slot = self.flows.get_mut(state)?;
        if slot.consumed || self.is_expired(&slot.flow, now) {
            return None;
        }
        slot.consumed = true;
        Some(slot.flow.clone())
    }

    /// Publish the outcome of a flow to everyone awaiting it. The first outcome
    /// sticks; a replayed callback cannot overwrite it.
    pub fn complete(&self, state: &str, outcome: FlowOutcome) {
        if let Some(slot) = self.flows.get(state) {
            slot.completion.send_if_modified(|current| {
                if current.is_some() {
                    return false;
                }
                *current = Some(outcome);
                true
            });
        }
    }

    /// State token of the most recent unexpired `platform` flow `user_id` started from `widget_id`.
    pub fn state_for_widget(&self, platform: Platform, user_id: &str, widget_id: &str) -> Option<String> {
        let now = Utc::now();
        self.flows
            .iter()
            .filter(|e| e.flow.platform == platform && e.flow.user_id == user_id)
            .filter(|e| e.flow.widget_id.as_deref() == Some(widget_id))
            .filter(|e| !self.is_expired(&e.flow, now))
            .max_by_key(|e| e.flow.created_at)
            .map(|e| e.key().clone())
    }

    /// Wait for the callback of the flow registered under `state`.
    ///
    /// Resolves immediately if the flow already completed. Gives up when the
    /// flow's state expires.
    pub async fn await_completion(&self, state: &str) -> Result<FlowOutcome, WaitError> {
        let (mut receiver, deadline) = {
            let slot = self.flows.get(state).ok_or(WaitError::UnknownFlow)?;
            (
                slot.completion.subscribe(),
                slot.flow.created_at + self.ttl,
            )
        };

        let remaining = (deadline - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        // The watch::Ref borrows `receiver`; clone out of it before returning
        let outcome = match tokio::time::timeout(remaining, receiver.wait_for(Option::is_some)).await {
            Ok(Ok(outcome)) => outcome.clone(),
            // Sender dropped: the slot was purged before completion
            Ok(Err(_)) => None,
            Err(_) => None,
        };
        outcome.ok_or(WaitError::TimedOut)
    }

    /// Clean up expired flows (should be called periodically)
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.flows.retain(|_, slot| !self.is_expired(&slot.flow, now));
    }

    /// Get count of tracked flows (for debugging/monitoring)
    pub fn count(&self) -> usize {
        self.flows.len()
    }
}

/// Background task to periodically clean up expired flows
pub async fn run_state_cleanup(registry: FlowRegistry, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        registry.cleanup_expired();
        tracing::debug!("OAuth state cleanup complete, {} flows remaining", registry.count());
    }
}
