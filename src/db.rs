use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::debug;

use crate::config::Config;

/// Connections shared by the CLI command and its background job task.
const MAX_CONNECTIONS: u32 = 5;

/// Open the configured database, creating the file and its directory.
///
/// WAL lets status reads proceed while a job writes. Writers wait up to
/// the busy timeout instead of failing with `SQLITE_BUSY`, which the
/// pattern merge retry loop relies on.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    debug!(path = %db_path.display(), "database opened");
    Ok(pool)
}
