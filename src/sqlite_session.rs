//! SQLite-backed [`SessionStore`].
//!
//! Expired rows are invisible to `get` and purged on every `put`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use zip_content_replacer_core::session::SessionStore;

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete all expired rows; returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp_millis();
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = chrono::Utc::now().timestamp_millis();
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM sessions WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let purged = self.purge_expired().await?;
        if purged > 0 {
            tracing::debug!(purged, "purged expired session rows");
        }
        let expires_at = chrono::Utc::now().timestamp_millis() + ttl.as_millis() as i64;
        sqlx::query(
            "INSERT INTO sessions (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
