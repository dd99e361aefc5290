use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::{self, Config};

/// Connects a bounded pool sized to roughly the number of request workers
/// (§5: "all access goes through a bounded connection pool"). Reads are
/// single-statement and non-transactional; writes take an explicit
/// transaction at the call site.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = config::store_path(config);

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    Ok(pool)
}
