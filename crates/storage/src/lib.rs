//! Persisted key-value records that survive dashboard restarts.
//!
//! The only record the client core reads is the session identity stored under
//! [`USER_INFO_KEY`]; it is written at sign-in and removed at sign-out.

use anyhow::{Context, Result};
use shared::protocol::{UserInfoRecord, USER_INFO_KEY};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Clone)]
pub struct SessionStore {
    pool: Pool<Sqlite>,
}

impl SessionStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid session database url '{database_url}'"))?
            .create_if_missing(true);
        // Every pooled connection to an in-memory database is a separate database.
        let max_connections = if database_url.starts_with(MEMORY_URL) {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;

        let store = Self { pool };
        store.ensure_records_table().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_records_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_records (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure kv_records table exists")?;
        Ok(())
    }

    pub async fn load_raw(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read record '{key}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_records (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write record '{key}'"))?;
        Ok(())
    }

    /// Returns whether a record was present.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete record '{key}'"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Raw session record as last written. Parsing is left to the reader so a
    /// corrupt record can be reported instead of failing the load.
    pub async fn load_user_info(&self) -> Result<Option<String>> {
        self.load_raw(USER_INFO_KEY).await
    }

    pub async fn save_user_info(&self, record: &UserInfoRecord) -> Result<()> {
        let raw = serde_json::to_string(record).context("failed to encode session record")?;
        self.put_raw(USER_INFO_KEY, &raw).await?;
        debug!(user_id = %record.data.id, "session: stored user info");
        Ok(())
    }

    pub async fn clear_session(&self) -> Result<bool> {
        let removed = self.remove(USER_INFO_KEY).await?;
        debug!(removed, "session: cleared user info");
        Ok(removed)
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with(MEMORY_URL) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
