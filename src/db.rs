use anyhow::{bail, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Database file kept inside the index directory.
pub const INDEX_FILE: &str = "index.sqlite";

pub fn index_file(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// Connect to the index database, creating the directory and file if needed.
pub async fn connect(dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(dir)?;
    pool_for(&index_file(dir), true).await
}

/// Connect to an index database that must already exist.
pub async fn connect_existing(dir: &Path) -> Result<SqlitePool> {
    let path = index_file(dir);
    if !path.is_file() {
        bail!("{} not found", path.display());
    }
    pool_for(&path, false).await
}

async fn pool_for(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
