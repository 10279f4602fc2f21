//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait covers what the index needs from a backend:
//! collection bookkeeping, incremental upserts keyed by chunk ID, and a
//! cosine-similarity candidate scan. Two backends exist:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`sqlite::SqliteStore`] | persisted index on disk |
//! | [`memory::InMemoryStore`] | tests and throwaway sessions |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::IndexEntry;

/// Distance metric recorded for every collection.
pub const COSINE: &str = "cosine";

/// Metadata recorded for a named collection at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub metric: String,
    pub model: String,
    pub dims: usize,
}

/// An index entry together with its similarity to a query vector.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    pub score: f32,
}

/// Abstract storage backend for embedded chunks.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_collection`](VectorStore::create_collection) | Register a collection (no-op if present) |
/// | [`get_collection`](VectorStore::get_collection) | Look up collection metadata |
/// | [`set_complete`](VectorStore::set_complete) | Mark a build as finished or in progress |
/// | [`is_complete`](VectorStore::is_complete) | Whether the last build finished |
/// | [`entry_hashes`](VectorStore::entry_hashes) | Chunk ID → text hash for staleness checks |
/// | [`upsert_entries`](VectorStore::upsert_entries) | Insert or replace entries by chunk ID |
/// | [`delete_entries`](VectorStore::delete_entries) | Remove entries by chunk ID |
/// | [`count_entries`](VectorStore::count_entries) | Number of entries |
/// | [`count_documents`](VectorStore::count_documents) | Number of distinct source documents |
/// | [`nearest`](VectorStore::nearest) | Top-`limit` entries by cosine similarity |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(&self, info: &CollectionInfo) -> Result<()>;

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// New collections start incomplete.
    async fn set_complete(&self, collection: &str, complete: bool) -> Result<()>;

    async fn is_complete(&self, collection: &str) -> Result<bool>;

    async fn entry_hashes(&self, collection: &str) -> Result<HashMap<String, String>>;

    async fn upsert_entries(&self, collection: &str, entries: &[IndexEntry]) -> Result<()>;

    /// Returns the number of entries removed.
    async fn delete_entries(&self, collection: &str, chunk_ids: &[String]) -> Result<u64>;

    async fn count_entries(&self, collection: &str) -> Result<u64>;

    async fn count_documents(&self, collection: &str) -> Result<u64>;

    /// Entries ordered by descending cosine similarity to `query`, ties
    /// broken by chunk ID.
    async fn nearest(&self, collection: &str, query: &[f32], limit: usize)
        -> Result<Vec<ScoredEntry>>;
}

/// Rank `entries` against `query` and keep the best `limit`.
pub(crate) fn rank_by_similarity(
    entries: Vec<IndexEntry>,
    query: &[f32],
    limit: usize,
) -> Vec<ScoredEntry> {
    let mut scored: Vec<ScoredEntry> = entries
        .into_iter()
        .map(|entry| {
            let score = crate::embedding::cosine_similarity(query, &entry.vector);
            ScoredEntry { entry, score }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entry.chunk_id.cmp(&b.entry.chunk_id))
    });
    scored.truncate(limit);
    scored
}
