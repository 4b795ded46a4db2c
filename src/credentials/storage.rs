//! Encrypted credential storage using SQLite.

use super::{Credential, PlatformIdentity, SealedToken, TokenCipher};
use crate::platform::Platform;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Stored connection metadata, readable even after tokens were cleared.
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionRecord {
    pub platform: Platform,
    pub identity: PlatformIdentity,
    pub granted_scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// False once tokens were cleared after a revoked refresh token.
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub updated_at: DateTime<Utc>,
}

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     id INTEGER PRIMARY KEY,
///     user_id TEXT NOT NULL,
///     platform TEXT NOT NULL,
///     access_token TEXT,                -- Encrypted, NULL once cleared
///     access_token_nonce TEXT,
///     refresh_token TEXT,               -- Encrypted (optional)
///     refresh_token_nonce TEXT,
///     expires_at TEXT,                  -- RFC 3339 (optional)
///     identity TEXT NOT NULL,           -- JSON PlatformIdentity
///     granted_scopes TEXT NOT NULL,     -- JSON array
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL,
///     UNIQUE(user_id, platform)
/// );
/// ```
///
/// Writes are last-writer-wins upserts keyed by (user_id, platform).
pub struct CredentialStore {
    conn: Mutex<Connection>,
    cipher: TokenCipher,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let cipher = TokenCipher::from_base64_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                access_token TEXT,
                access_token_nonce TEXT,
                refresh_token TEXT,
                refresh_token_nonce TEXT,
                expires_at TEXT,
                identity TEXT NOT NULL,
                granted_scopes TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, platform)
            )
            "#,
            [],
        )
        .context("Failed to create credentials table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))
    }

    fn seal_optional(&self, token: Option<&str>) -> Result<(Option<String>, Option<String>)> {
        match token {
            Some(token) => {
                let sealed = self.cipher.seal(token)?;
                Ok((Some(sealed.ciphertext), Some(sealed.nonce)))
            }
            None => Ok((None, None)),
        }
    }

    fn open_optional(&self, ciphertext: Option<String>, nonce: Option<String>) -> Result<Option<String>> {
        match (ciphertext, nonce) {
            (Some(ciphertext), Some(nonce)) => {
                Ok(Some(self.cipher.open(&SealedToken { ciphertext, nonce })?))
            }
            _ => Ok(None),
        }
    }

    /// Stores the credential from a completed OAuth flow, replacing any previous one.
    pub fn store(&self, user_id: &str, credential: &Credential) -> Result<()> {
        let access = self
            .cipher
            .seal(&credential.access_token)
            .context("Failed to encrypt access token")?;
        let (refresh_token, refresh_token_nonce) = self
            .seal_optional(credential.refresh_token.as_deref())
            .context("Failed to encrypt refresh token")?;

        let identity = serde_json::to_string(&credential.identity)?;
        let scopes = serde_json::to_string(&credential.granted_scopes)?;
        let expires_at = credential.expires_at.map(|dt| dt.to_rfc3339());
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO credentials (
                    user_id, platform,
                    access_token, access_token_nonce,
                    refresh_token, refresh_token_nonce,
                    expires_at, identity, granted_scopes,
                    created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                ON CONFLICT(user_id, platform) DO UPDATE SET
                    access_token = excluded.access_token,
                    access_token_nonce = excluded.access_token_nonce,
                    refresh_token = excluded.refresh_token,
                    refresh_token_nonce = excluded.refresh_token_nonce,
                    expires_at = excluded.expires_at,
                    identity = excluded.identity,
                    granted_scopes = excluded.granted_scopes,
                    updated_at = excluded.updated_at
                "#,
                params![
                    user_id,
                    credential.platform().as_str(),
                    access.ciphertext,
                    access.nonce,
                    refresh_token,
                    refresh_token_nonce,
                    expires_at,
                    identity,
                    scopes,
                    now,
                ],
            )
            .context("Failed to store credentials")?;

        Ok(())
    }

    /// Retrieves a usable credential.
    ///
    /// Returns `Ok(None)` when no row exists or when its tokens were cleared.
    pub fn get(&self, user_id: &str, platform: Platform) -> Result<Option<Credential>> {
        let row = self
            .conn()?
            .query_row(
                r#"
                SELECT access_token, access_token_nonce,
                       refresh_token, refresh_token_nonce,
                       expires_at, identity, granted_scopes
                FROM credentials
                WHERE user_id = ?1 AND platform = ?2
                "#,
                params![user_id, platform.as_str()],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query credentials")?;

        let Some((access, access_nonce, refresh, refresh_nonce, expires_at, identity, scopes)) = row
        else {
            return Ok(None);
        };

        let Some(access_token) = self
            .open_optional(access, access_nonce)
            .context("Failed to decrypt access token")?
        else {
            return Ok(None);
        };
        let refresh_token = self
            .open_optional(refresh, refresh_nonce)
            .context("Failed to decrypt refresh token")?;

        Ok(Some(Credential {
            access_token,
            refresh_token,
            expires_at: parse_timestamp(expires_at)?,
            identity: serde_json::from_str(&identity).context("Corrupt identity column")?,
            granted_scopes: serde_json::from_str(&scopes).context("Corrupt scopes column")?,
        }))
    }

    /// Rewrites the token columns after a refresh, keeping identity and scopes.
    ///
    /// Returns `Ok(false)` if no row exists for (user, platform).
    pub fn update_tokens(
        &self,
        user_id: &str,
        platform: Platform,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let access = self
            .cipher
            .seal(access_token)
            .context("Failed to encrypt access token")?;
        let (refresh, refresh_nonce) = self
            .seal_optional(refresh_token)
            .context("Failed to encrypt refresh token")?;

        let rows = self
            .conn()?
            .execute(
                r#"
                UPDATE credentials SET
                    access_token = ?3, access_token_nonce = ?4,
                    refresh_token = ?5, refresh_token_nonce = ?6,
                    expires_at = ?7, updated_at = ?8
                WHERE user_id = ?1 AND platform = ?2
                "#,
                params![
                    user_id,
                    platform.as_str(),
                    access.ciphertext,
                    access.nonce,
                    refresh,
                    refresh_nonce,
                    expires_at.map(|dt| dt.to_rfc3339()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to update tokens")?;

        Ok(rows > 0)
    }

    /// Clears access token, refresh token and expiry, forcing a reconnect.
    ///
    /// Identity and scopes are kept so the account can still be named.
    pub fn clear_tokens(&self, user_id: &str, platform: Platform) -> Result<bool> {
        let rows = self
            .conn()?
            .execute(
                r#"
                UPDATE credentials SET
                    access_token = NULL, access_token_nonce = NULL,
                    refresh_token = NULL, refresh_token_nonce = NULL,
                    expires_at = NULL, updated_at = ?3
                WHERE user_id = ?1 AND platform = ?2
                "#,
                params![user_id, platform.as_str(), Utc::now().to_rfc3339()],
            )
            .context("Failed to clear tokens")?;

        Ok(rows > 0)
    }

    /// Deletes the row for (user, platform). Returns `Ok(false)` if none existed.
    pub fn delete(&self, user_id: &str, platform: Platform) -> Result<bool> {
        let rows = self
            .conn()?
            .execute(
                "DELETE FROM credentials WHERE user_id = ?1 AND platform = ?2",
                params![user_id, platform.as_str()],
            )
            .context("Failed to delete credentials")?;

        Ok(rows > 0)
    }

    /// Connection metadata for one platform, without decrypting tokens.
    pub fn connection(&self, user_id: &str, platform: Platform) -> Result<Option<ConnectionRecord>> {
        self.conn()?
            .query_row(
                r#"
                SELECT platform, identity, granted_scopes, expires_at,
                       access_token IS NOT NULL, refresh_token IS NOT NULL, updated_at
                FROM credentials
                WHERE user_id = ?1 AND platform = ?2
                "#,
                params![user_id, platform.as_str()],
                read_raw_connection,
            )
            .optional()
            .context("Failed to query connection")?
            .map(RawConnection::into_record)
            .transpose()
    }

    /// Connection metadata for every platform the user has a row for.
    pub fn list_connections(&self, user_id: &str) -> Result<Vec<ConnectionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT platform, identity, granted_scopes, expires_at,
                       access_token IS NOT NULL, refresh_token IS NOT NULL, updated_at
                FROM credentials
                WHERE user_id = ?1
                ORDER BY platform
                "#,
            )
            .context("Failed to prepare query")?;

        let raw = stmt
            .query_map(params![user_id], read_raw_connection)
            .context("Failed to execute query")?
            .collect::<Result<Vec<RawConnection>, _>>()
            .context("Failed to read results")?;

        raw.into_iter().map(RawConnection::into_record).collect()
    }
}

struct RawConnection {
    platform: String,
    identity: String,
    scopes: String,
    expires_at: Option<String>,
    has_access_token: bool,
    has_refresh_token: bool,
    updated_at: String,
}

fn read_raw_connection(row: &Row<'_>) -> rusqlite::Result<RawConnection> {
    Ok(RawConnection {
        platform: row.get(0)?,
        identity: row.get(1)?,
        scopes: row.get(2)?,
        expires_at: row.get(3)?,
        has_access_token: row.get(4)?,
        has_refresh_token: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl RawConnection {
    fn into_record(self) -> Result<ConnectionRecord> {
        Ok(ConnectionRecord {
            platform: self.platform.parse()?,
            identity: serde_json::from_str(&self.identity).context("Corrupt identity column")?,
            granted_scopes: serde_json::from_str(&self.scopes).context("Corrupt scopes column")?,
            expires_at: parse_timestamp(self.expires_at)?,
            has_access_token: self.has_access_token,
            has_refresh_token: self.has_refresh_token,
            updated_at: parse_timestamp(Some(self.updated_at))?
                .ok_or_else(|| anyhow!("Missing updated_at"))?,
        })
    }
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .context("Failed to parse timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use chrono::Duration;

    fn create_test_store() -> CredentialStore {
        let key = BASE64.encode([0u8; 32]);
        CredentialStore::new(":memory:", &key).expect("Failed to create test store")
    }

    fn youtube_credential() -> Credential {
        Credential {
            access_token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            identity: PlatformIdentity::Youtube {
                channel_id: Some("UC123".to_string()),
                channel_title: Some("My Channel".to_string()),
            },
            granted_scopes: vec![
                "https://www.googleapis.com/auth/youtube.upload".to_string(),
                "https://www.googleapis.com/auth/youtube.readonly".to_string(),
            ],
        }
    }

    #[test]
    fn test_store_and_get() {
        let store = create_test_store();
        let cred = youtube_credential();
        store.store("user1", &cred).unwrap();

        let got = store.get("user1", Platform::Youtube).unwrap().unwrap();
        assert_eq!(got.access_token, cred.access_token);
        assert_eq!(got.refresh_token, cred.refresh_token);
        assert_eq!(got.identity, cred.identity);
        assert_eq!(got.granted_scopes, cred.granted_scopes);
        assert!(got.expires_at.is_some());
    }

    #[test]
    fn test_get_nonexistent() {
        let store = create_test_store();
        assert!(store.get("user1", Platform::Youtube).unwrap().is_none());
        assert!(store.connection("user1", Platform::Youtube).unwrap().is_none());
    }

    #[test]
    fn test_new_flow_overwrites_entirely() {
        let store = create_test_store();
        store.store("user1", &youtube_credential()).unwrap();

        let replacement = Credential {
            access_token: "ya29.second".to_string(),
            refresh_token: None,
            expires_at: None,
            identity: PlatformIdentity::Youtube {
                channel_id: Some("UC999".to_string()),
                channel_title: None,
            },
            granted_scopes: vec![],
        };
        store.store("user1", &replacement).unwrap();

        let got = store.get("user1", Platform::Youtube).unwrap().unwrap();
        assert_eq!(got.access_token, "ya29.second");
        assert!(got.refresh_token.is_none());
        assert!(got.expires_at.is_none());
        assert_eq!(got.identity.publish_target(), Some("UC999"));
        assert!(got.granted_scopes.is_empty());
    }

    #[test]
    fn test_update_tokens_keeps_identity() {
        let store = create_test_store();
        store.store("user1", &youtube_credential()).unwrap();

        let new_expiry = Utc::now() + Duration::hours(2);
        let updated = store
            .update_tokens("user1", Platform::Youtube, "ya29.new", Some("1//refresh"), Some(new_expiry))
            .unwrap();
        assert!(updated);

        let got = store.get("user1", Platform::Youtube).unwrap().unwrap();
        assert_eq!(got.access_token, "ya29.new");
        assert_eq!(got.identity.display_name(), Some("My Channel"));
        assert_eq!(got.expires_at.map(|t| t.timestamp()), Some(new_expiry.timestamp()));

        // No row → nothing to update
        assert!(!store
            .update_tokens("ghost", Platform::Youtube, "x", None, None)
            .unwrap());
    }

    #[test]
    fn test_clear_tokens_hides_credential_but_keeps_connection() {
        let store = create_test_store();
        store.store("user1", &youtube_credential()).unwrap();

        assert!(store.clear_tokens("user1", Platform::Youtube).unwrap());
        assert!(store.get("user1", Platform::Youtube).unwrap().is_none());

        let record = store.connection("user1", Platform::Youtube).unwrap().unwrap();
        assert!(!record.has_access_token);
        assert!(!record.has_refresh_token);
        assert!(record.expires_at.is_none());
        assert_eq!(record.identity.publish_target(), Some("UC123"));
    }

    #[test]
    fn test_delete() {
        let store = create_test_store();
        store.store("user1", &youtube_credential()).unwrap();

        assert!(store.delete("user1", Platform::Youtube).unwrap());
        assert!(store.get("user1", Platform::Youtube).unwrap().is_none());
        assert!(!store.delete("user1", Platform::Youtube).unwrap());
    }

    #[test]
    fn test_users_and_platforms_are_isolated() {
        let store = create_test_store();
        store.store("user1", &youtube_credential()).unwrap();
        store
            .store(
                "user1",
                &Credential {
                    access_token: "IGQV".to_string(),
                    refresh_token: None,
                    expires_at: None,
                    identity: PlatformIdentity::Instagram {
                        user_id: Some("1784".to_string()),
                        username: Some("shop".to_string()),
                    },
                    granted_scopes: vec![],
                },
            )
            .unwrap();
        store.store("user2", &youtube_credential()).unwrap();

        let list = store.list_connections("user1").unwrap();
        let platforms: Vec<Platform> = list.iter().map(|r| r.platform).collect();
        assert_eq!(platforms, vec![Platform::Instagram, Platform::Youtube]);

        assert!(store.get("user2", Platform::Instagram).unwrap().is_none());
        assert!(store.list_connections("user3").unwrap().is_empty());
    }

    #[test]
    fn test_tokens_are_encrypted_at_rest() {
        let store = create_test_store();
        store.store("user1", &youtube_credential()).unwrap();

        let raw: String = store
            .conn()
            .unwrap()
            .query_row("SELECT access_token FROM credentials", [], |row| row.get(0))
            .unwrap();
        assert!(!raw.contains("ya29"));
    }

    #[test]
    fn test_invalid_encryption_key() {
        assert!(CredentialStore::new(":memory:", "short").is_err());
        assert!(CredentialStore::new(":memory:", "not-valid-base64!@#$").is_err());
    }
}
