use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::{EngineSettings, ImportEngine};
use crate::sqlite_session::SqliteSessionStore;
use crate::sqlite_store::SqliteContentStore;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// The import engine over the SQLite content and session stores.
pub async fn open_engine(config: &Config) -> Result<ImportEngine> {
    let pool = connect(config).await?;
    Ok(ImportEngine::new(
        Arc::new(SqliteContentStore::new(pool.clone())),
        Arc::new(SqliteSessionStore::new(pool)),
        EngineSettings::from_config(config),
    ))
}
