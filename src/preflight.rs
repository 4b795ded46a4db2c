//! Pre-publish configuration check.
//!
//! Looks only at stored state: no provider calls, no refresh attempts.

use crate::config::PublishConfig;
use crate::credentials::CredentialStore;
use crate::platform::Platform;
use crate::publish::resolve_publish_target;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigErrorKind {
    NotConnected,
    Expired,
    Incomplete,
    UnknownPlatform,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfigError {
    pub platform: String,
    pub kind: ConfigErrorKind,
    pub message: String,
}

/// Checks that every requested platform has a current, complete credential.
///
/// Any credential past its expiry is reported, refresh token or not. The
/// publish target is resolved the same way the adapters resolve it.
pub fn check_configuration(
    store: &CredentialStore,
    publish: &PublishConfig,
    user_id: &str,
    platforms: &[String],
    now: DateTime<Utc>,
) -> Result<Vec<ConfigError>> {
    let mut errors = Vec::new();

    for name in platforms {
        let platform = match name.parse::<Platform>() {
            Ok(p) => p,
            Err(_) => {
                errors.push(ConfigError {
                    platform: name.clone(),
                    kind: ConfigErrorKind::UnknownPlatform,
                    message: format!("{} is not a supported platform", name),
                });
                continue;
            }
        };
        let label = platform.display_name();

        let Some(credential) = store.get(user_id, platform)? else {
            errors.push(ConfigError {
                platform: platform.to_string(),
                kind: ConfigErrorKind::NotConnected,
                message: format!("{} is not connected. Connect your {} account first.", label, label),
            });
            continue;
        };

        if credential.is_expired_at(now) {
            let message = if credential.refresh_token.is_some() {
                format!(
                    "Your {} access token has expired. It will be renewed when publishing; reconnect {} if that fails.",
                    label, label
                )
            } else {
                format!("Your {} connection has expired. Reconnect your {} account.", label, label)
            };
            errors.push(ConfigError {
                platform: platform.to_string(),
                kind: ConfigErrorKind::Expired,
                message,
            });
            continue;
        }

        if let Err(e) = resolve_publish_target(&credential.identity, publish.target_override(platform)) {
            errors.push(ConfigError {
                platform: platform.to_string(),
                kind: ConfigErrorKind::Incomplete,
                message: e.to_string(),
            });
        }
    }

    Ok(errors)
}

/// One user-facing message listing every error as a bullet, or `None` if there are none.
pub fn format_config_errors(errors: &[ConfigError]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    let bullets: Vec<String> = errors.iter().map(|e| format!("• {}", e.message)).collect();
    Some(format!(
        "Some platforms need attention before publishing:\n{}",
        bullets.join("\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credential, PlatformIdentity};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use chrono::Duration;

    fn store() -> CredentialStore {
        CredentialStore::new(":memory:", &BASE64.encode([3u8; 32])).unwrap()
    }

    fn names(platforms: &[&str]) -> Vec<String> {
        platforms.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_all_configured() {
        let store = store();
        store
            .store(
                "u",
                &Credential {
                    access_token: "t".to_string(),
                    refresh_token: None,
                    expires_at: Some(Utc::now() + Duration::days(30)),
                    identity: PlatformIdentity::Instagram {
                        user_id: Some("1784".to_string()),
                        username: None,
                    },
                    granted_scopes: vec![],
                },
            )
            .unwrap();

        let errors = check_configuration(&store, &PublishConfig::default(), "u", &names(&["instagram"]), Utc::now()).unwrap();
        assert!(errors.is_empty());
        assert_eq!(format_config_errors(&errors), None);
    }

    #[test]
    fn test_each_error_kind() {
        let store = store();
        let now = Utc::now();
        store
            .store(
                "u",
                &Credential {
                    access_token: "t".to_string(),
                    refresh_token: None,
                    expires_at: Some(now - Duration::minutes(1)),
                    identity: PlatformIdentity::Instagram {
                        user_id: Some("1".to_string()),
                        username: None,
                    },
                    granted_scopes: vec![],
                },
            )
            .unwrap();
        store
            .store(
                "u",
                &Credential {
                    access_token: "t".to_string(),
                    refresh_token: None,
                    expires_at: None,
                    identity: PlatformIdentity::unknown(Platform::Facebook),
                    granted_scopes: vec![],
                },
            )
            .unwrap();

        let errors = check_configuration(
            &store,
            &PublishConfig::default(),
            "u",
            &names(&["instagram", "facebook", "youtube", "friendster"]),
            now,
        )
        .unwrap();
        let kinds: Vec<_> = errors.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ConfigErrorKind::Expired,
                ConfigErrorKind::Incomplete,
                ConfigErrorKind::NotConnected,
                ConfigErrorKind::UnknownPlatform,
            ]
        );
        assert!(errors[1].message.contains("page id"));

        let message = format_config_errors(&errors).unwrap();
        assert_eq!(message.matches("\n• ").count(), 4);
        assert!(message.contains("Reconnect your Instagram account"));
    }

    #[test]
    fn test_expired_with_refresh_token_is_reported() {
        let store = store();
        store
            .store(
                "u",
                &Credential {
                    access_token: "t".to_string(),
                    refresh_token: Some("1//r".to_string()),
                    expires_at: Some(Utc::now() - Duration::days(3)),
                    identity: PlatformIdentity::Youtube {
                        channel_id: Some("UC1".to_string()),
                        channel_title: None,
                    },
                    granted_scopes: vec![],
                },
            )
            .unwrap();
        let errors =
            check_configuration(&store, &PublishConfig::default(), "u", &names(&["youtube"]), Utc::now()).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ConfigErrorKind::Expired);
        assert!(errors[0].message.contains("YouTube access token has expired"));
    }

    #[test]
    fn test_facebook_profile_id_is_not_a_page() {
        let store = store();
        store
            .store(
                "u",
                &Credential {
                    access_token: "t".to_string(),
                    refresh_token: None,
                    expires_at: None,
                    identity: PlatformIdentity::Facebook {
                        user_id: Some("100".to_string()),
                        page_id: Some("100".to_string()),
                        page_name: None,
                    },
                    granted_scopes: vec![],
                },
            )
            .unwrap();
        let errors =
            check_configuration(&store, &PublishConfig::default(), "u", &names(&["facebook"]), Utc::now()).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ConfigErrorKind::Incomplete);
        assert!(errors[0].message.contains("matches the user id"));
    }

    #[test]
    fn test_configured_business_id_completes_instagram() {
        let store = store();
        store
            .store(
                "u",
                &Credential {
                    access_token: "t".to_string(),
                    refresh_token: None,
                    expires_at: None,
                    identity: PlatformIdentity::unknown(Platform::Instagram),
                    granted_scopes: vec![],
                },
            )
            .unwrap();

        let errors =
            check_configuration(&store, &PublishConfig::default(), "u", &names(&["instagram"]), Utc::now()).unwrap();
        assert_eq!(errors[0].kind, ConfigErrorKind::Incomplete);

        let publish = PublishConfig {
            instagram_business_id: Some("1784".to_string()),
            ..PublishConfig::default()
        };
        let errors = check_configuration(&store, &publish, "u", &names(&["instagram"]), Utc::now()).unwrap();
        assert!(errors.is_empty());
    }
}
