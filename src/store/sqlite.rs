//! SQLite-backed [`VectorStore`] implementation.
//!
//! Entries live in a single `entries` table keyed by `(collection, chunk_id)`
//! with the embedding stored as a little-endian `f32` BLOB. Nearest-neighbour
//! search loads the collection's vectors and ranks them in Rust.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::migrate;
use crate::models::{DocMetadata, IndexEntry};

use super::{rank_by_similarity, CollectionInfo, ScoredEntry, VectorStore};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the index in `dir`, creating the database and schema if needed.
    pub async fn create(dir: &Path) -> Result<Self> {
        let pool = db::connect(dir).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Open an index previously written to `dir`.
    ///
    /// Fails when the database file is absent, unreadable, or lacks the
    /// expected tables. The schema is never created here.
    pub async fn open_existing(dir: &Path) -> Result<Self> {
        let pool = db::connect_existing(dir).await?;
        let missing = migrate::missing_tables(&pool)
            .await
            .context("not a readable index database")?;
        if !missing.is_empty() {
            bail!("index database lacks tables: {}", missing.join(", "));
        }
        Ok(Self::new(pool))
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<IndexEntry> {
    let metadata_json: String = row.get("metadata_json");
    let metadata: DocMetadata =
        serde_json::from_str(&metadata_json).context("invalid entry metadata")?;
    let position: i64 = row.get("position");
    let blob: Vec<u8> = row.get("embedding");

    Ok(IndexEntry {
        chunk_id: row.get("chunk_id"),
        document_id: row.get("document_id"),
        position: position as usize,
        text: row.get("text"),
        hash: row.get("hash"),
        metadata,
        vector: blob_to_vec(&blob),
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn create_collection(&self, info: &CollectionInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collections (name, metric, model, dims, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(&info.name)
        .bind(&info.metric)
        .bind(&info.model)
        .bind(info.dims as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_complete(&self, collection: &str, complete: bool) -> Result<()> {
        let built_at = complete.then(|| chrono::Utc::now().timestamp());
        let result = sqlx::query("UPDATE collections SET built_at = ? WHERE name = ?")
            .bind(built_at)
            .bind(collection)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("collection '{}' does not exist", collection);
        }
        Ok(())
    }

    async fn is_complete(&self, collection: &str) -> Result<bool> {
        let built_at: Option<Option<i64>> =
            sqlx::query_scalar("SELECT built_at FROM collections WHERE name = ?")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(matches!(built_at, Some(Some(_))))
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let row = sqlx::query("SELECT name, metric, model, dims FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| {
            let dims: i64 = r.get("dims");
            CollectionInfo {
                name: r.get("name"),
                metric: r.get("metric"),
                model: r.get("model"),
                dims: dims as usize,
            }
        }))
    }

    async fn entry_hashes(&self, collection: &str) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT chunk_id, hash FROM entries WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get("chunk_id"), r.get("hash")))
            .collect())
    }

    async fn upsert_entries(&self, collection: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let metadata_json = serde_json::to_string(&entry.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO entries (collection, chunk_id, document_id, position, text,
                                     hash, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    position = excluded.position,
                    text = excluded.text,
                    hash = excluded.hash,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(collection)
            .bind(&entry.chunk_id)
            .bind(&entry.document_id)
            .bind(entry.position as i64)
            .bind(&entry.text)
            .bind(&entry.hash)
            .bind(&metadata_json)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_entries(&self, collection: &str, chunk_ids: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;

        for chunk_id in chunk_ids {
            let result = sqlx::query("DELETE FROM entries WHERE collection = ? AND chunk_id = ?")
                .bind(collection)
                .bind(chunk_id)
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected();
        }

        tx.commit().await?;
        Ok(removed)
    }

    async fn count_entries(&self, collection: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT document_id) FROM entries WHERE collection = ?",
        )
        .bind(collection)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn nearest(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_id, document_id, position, text, hash, metadata_json, embedding
            FROM entries
            WHERE collection = ?
            ORDER BY chunk_id
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .iter()
            .map(row_to_entry)
            .collect::<Result<Vec<_>>>()?;

        Ok(rank_by_similarity(entries, query, limit))
    }
}
