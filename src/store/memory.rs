//! In-memory [`VectorStore`] implementation.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`, each holding
//! its entries in a `BTreeMap`. Vector search is a
//! brute-force cosine scan, the same as the SQLite backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::IndexEntry;

use super::{rank_by_similarity, CollectionInfo, ScoredEntry, VectorStore};

#[derive(Default)]
struct StoredCollection {
    info: Option<CollectionInfo>,
    complete: bool,
    // BTreeMap keeps scans in chunk-ID order.
    entries: BTreeMap<String, IndexEntry>,
}

/// In-memory store; contents are lost when dropped.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow::anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn create_collection(&self, info: &CollectionInfo) -> Result<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let stored = collections.entry(info.name.clone()).or_default();
        if stored.info.is_none() {
            stored.info = Some(info.clone());
        }
        Ok(())
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.get(name).and_then(|c| c.info.clone()))
    }

    async fn set_complete(&self, collection: &str, complete: bool) -> Result<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        match collections.get_mut(collection) {
            Some(stored) if stored.info.is_some() => {
                stored.complete = complete;
                Ok(())
            }
            _ => anyhow::bail!("collection '{}' does not exist", collection),
        }
    }

    async fn is_complete(&self, collection: &str) -> Result<bool> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.get(collection).is_some_and(|c| c.complete))
    }

    async fn entry_hashes(&self, collection: &str) -> Result<HashMap<String, String>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(collection)
            .map(|c| {
                c.entries
                    .values()
                    .map(|e| (e.chunk_id.clone(), e.hash.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_entries(&self, collection: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let stored = collections.entry(collection.to_string()).or_default();
        for entry in entries {
            stored.entries.insert(entry.chunk_id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn delete_entries(&self, collection: &str, chunk_ids: &[String]) -> Result<u64> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let removed = chunk_ids
            .iter()
            .filter(|id| stored.entries.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn count_entries(&self, collection: &str) -> Result<u64> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(collection)
            .map(|c| c.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn count_documents(&self, collection: &str) -> Result<u64> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(collection)
            .map(|c| {
                c.entries
                    .values()
                    .map(|e| e.document_id.as_str())
                    .collect::<HashSet<_>>()
                    .len() as u64
            })
            .unwrap_or(0))
    }

    async fn nearest(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredEntry>> {
        let entries: Vec<IndexEntry> = {
            let collections = self.collections.read().map_err(poisoned)?;
            collections
                .get(collection)
                .map(|c| c.entries.values().cloned().collect())
                .unwrap_or_default()
        };
        Ok(rank_by_similarity(entries, query, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocMetadata;
    use crate::store::COSINE;

    fn entry(id: &str, doc: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk_id: id.to_string(),
            document_id: doc.to_string(),
            position: 0,
            text: format!("text of {}", id),
            hash: format!("hash-{}", id),
            metadata: DocMetadata {
                feature: doc.trim_end_matches(".md").to_string(),
                source: doc.to_string(),
            },
            vector,
        }
    }

    #[tokio::test]
    async fn test_collection_created_once() {
        let store = InMemoryStore::new();
        let info = CollectionInfo {
            name: "c".to_string(),
            metric: COSINE.to_string(),
            model: "m1".to_string(),
            dims: 2,
        };
        store.create_collection(&info).await.unwrap();
        let mut other = info.clone();
        other.model = "m2".to_string();
        store.create_collection(&other).await.unwrap();

        assert_eq!(store.get_collection("c").await.unwrap(), Some(info));
        assert_eq!(store.get_collection("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_completion_flag() {
        let store = InMemoryStore::new();
        assert!(store.set_complete("c", true).await.is_err());

        store
            .create_collection(&CollectionInfo {
                name: "c".to_string(),
                metric: COSINE.to_string(),
                model: "m".to_string(),
                dims: 2,
            })
            .await
            .unwrap();
        assert!(!store.is_complete("c").await.unwrap());
        store.set_complete("c", true).await.unwrap();
        assert!(store.is_complete("c").await.unwrap());
        assert!(!store.is_complete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_chunk_id() {
        let store = InMemoryStore::new();
        store
            .upsert_entries("c", &[entry("a.md#0", "a.md", vec![1.0, 0.0])])
            .await
            .unwrap();
        let mut replacement = entry("a.md#0", "a.md", vec![0.0, 1.0]);
        replacement.hash = "new".to_string();
        store.upsert_entries("c", &[replacement]).await.unwrap();

        assert_eq!(store.count_entries("c").await.unwrap(), 1);
        assert_eq!(store.entry_hashes("c").await.unwrap()["a.md#0"], "new");
    }

    #[tokio::test]
    async fn test_nearest_orders_by_similarity() {
        let store = InMemoryStore::new();
        store
            .upsert_entries(
                "c",
                &[
                    entry("a.md#0", "a.md", vec![1.0, 0.0]),
                    entry("b.md#0", "b.md", vec![0.0, 1.0]),
                    entry("c.md#0", "c.md", vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let hits = store.nearest("c", &[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry.chunk_id, "a.md#0");
        assert_eq!(hits[1].entry.chunk_id, "c.md#0");
        assert_eq!(store.count_documents("c").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_entries_counts_removed() {
        let store = InMemoryStore::new();
        store
            .upsert_entries("c", &[entry("a.md#0", "a.md", vec![1.0])])
            .await
            .unwrap();
        let removed = store
            .delete_entries("c", &["a.md#0".to_string(), "zzz".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count_entries("c").await.unwrap(), 0);
    }
}
