use anyhow::Result;
use sqlx::SqlitePool;

/// Tables every index database must contain.
pub const REQUIRED_TABLES: &[&str] = &["collections", "entries"];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per named collection, recording how its vectors were made
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            metric TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            -- NULL while a build is in progress or after one failed
            built_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            collection TEXT NOT NULL,
            chunk_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            PRIMARY KEY (collection, chunk_id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_entries_document ON entries(collection, document_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Names from [`REQUIRED_TABLES`] that are absent from the database.
pub async fn missing_tables(pool: &SqlitePool) -> Result<Vec<String>> {
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name = ?",
        )
        .bind(table)
        .fetch_one(pool)
        .await?;
        if !exists {
            missing.push(table.to_string());
        }
    }
    Ok(missing)
}
