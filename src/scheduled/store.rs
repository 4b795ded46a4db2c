//! Scheduled post persistence using SQLite.

use super::{PostStatus, ScheduledPost};
use crate::platform::Platform;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Mutex, MutexGuard};

const COLUMNS: &str = "id, user_id, content, platforms, scheduled_date, scheduled_time, media_urls, status, created_at, updated_at";

/// Persists scheduled posts in SQLite.
pub struct ScheduledPostStore {
    conn: Mutex<Connection>,
}

/// Raw column values; decoded outside the rusqlite row closure so errors keep context.
struct PostRow {
    id: String,
    user_id: String,
    content: String,
    platforms: String,
    scheduled_date: String,
    scheduled_time: String,
    media_urls: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl PostRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            content: row.get(2)?,
            platforms: row.get(3)?,
            scheduled_date: row.get(4)?,
            scheduled_time: row.get(5)?,
            media_urls: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn decode(self) -> Result<ScheduledPost> {
        let platforms: Vec<Platform> = serde_json::from_str(&self.platforms)
            .with_context(|| format!("Failed to parse platforms for post {}", self.id))?;
        let media_urls: Vec<String> = serde_json::from_str(&self.media_urls)
            .with_context(|| format!("Failed to parse media urls for post {}", self.id))?;
        let status: PostStatus = self
            .status
            .parse()
            .with_context(|| format!("Invalid status for post {}", self.id))?;
        Ok(ScheduledPost {
            platforms,
            media_urls,
            status,
            created_at: self
                .created_at
                .parse()
                .with_context(|| format!("Failed to parse created_at for post {}", self.id))?,
            updated_at: self
                .updated_at
                .parse()
                .with_context(|| format!("Failed to parse updated_at for post {}", self.id))?,
            id: self.id,
            user_id: self.user_id,
            content: self.content,
            scheduled_date: self.scheduled_date,
            scheduled_time: self.scheduled_time,
        })
    }
}

impl ScheduledPostStore {
    /// Opens (or creates) the SQLite database and ensures the table exists.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open scheduled posts DB at {}", db_path))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scheduled_posts (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL,
                content        TEXT NOT NULL,
                platforms      TEXT NOT NULL,
                scheduled_date TEXT NOT NULL,
                scheduled_time TEXT NOT NULL,
                media_urls     TEXT NOT NULL,
                status         TEXT NOT NULL,
                created_at     TEXT NOT NULL,
                updated_at     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scheduled_posts_user
                ON scheduled_posts (user_id, scheduled_date, scheduled_time);",
        )
        .context("Failed to create scheduled_posts table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Scheduled post store lock poisoned"))
    }

    pub fn insert(&self, post: &ScheduledPost) -> Result<()> {
        self.conn()?
            .execute(
                &format!("INSERT INTO scheduled_posts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)", COLUMNS),
                params![
                    post.id,
                    post.user_id,
                    post.content,
                    serde_json::to_string(&post.platforms)?,
                    post.scheduled_date,
                    post.scheduled_time,
                    serde_json::to_string(&post.media_urls)?,
                    post.status.as_str(),
                    post.created_at.to_rfc3339(),
                    post.updated_at.to_rfc3339(),
                    post.user_id,
                ],
            )
            .context("Failed to insert scheduled post")?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<ScheduledPost>> {
        let row = self
            .conn()?
            .query_row(
                &format!("SELECT {} FROM scheduled_posts WHERE id = ?1", COLUMNS),
                params![id],
                PostRow::from_row,
            )
            .optional()
            .context("Failed to query scheduled post")?;
        row.map(PostRow::decode).transpose()
    }

    /// A user's posts, earliest schedule first.
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<ScheduledPost>> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM scheduled_posts WHERE user_id = ?1
                     ORDER BY scheduled_date ASC, scheduled_time ASC, created_at ASC",
                    COLUMNS
                ))
                .context("Failed to prepare list query")?;
            let rows = stmt
                .query_map(params![user_id], PostRow::from_row)
                .context("Failed to query scheduled posts")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read scheduled post row")?;
            rows
        };
        rows.into_iter().map(PostRow::decode).collect()
    }

    /// Writes every mutable column. Returns `Ok(false)` if the post does not exist
    /// or belongs to another user.
    pub fn update(&self, post: &ScheduledPost) -> Result<bool> {
        let rows = self
            .conn()?
            .execute(
                "UPDATE scheduled_posts SET
                    content = ?2, platforms = ?3, scheduled_date = ?4, scheduled_time = ?5,
                    media_urls = ?6, status = ?7, updated_at = ?8
                 WHERE id = ?1 AND user_id = ?9",
                params![
                    post.id,
                    post.content,
                    serde_json::to_string(&post.platforms)?,
                    post.scheduled_date,
                    post.scheduled_time,
                    serde_json::to_string(&post.media_urls)?,
                    post.status.as_str(),
                    post.updated_at.to_rfc3339(),
                    post.user_id,
                ],
            )
            .context("Failed to update scheduled post")?;
        Ok(rows > 0)
    }

    /// Deletes one of `user_id`'s posts. Returns `Ok(false)` if they own no such post.
    pub fn delete(&self, user_id: &str, id: &str) -> Result<bool> {
        let rows = self
            .conn()?
            .execute(
                "DELETE FROM scheduled_posts WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .context("Failed to delete scheduled post")?;
        Ok(rows > 0)
    }
}
