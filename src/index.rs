//! Vector index over document chunks.
//!
//! An [`IndexHandle`] couples a [`VectorStore`], the [`EmbeddingProvider`]
//! that produced its vectors, and the collection they live in. Handles are
//! cheap to clone and shared read-only across chat turns.
//!
//! # Lifecycle
//!
//! ```text
//! index dir present & non-empty ──► open_persisted ──► IndexHandle
//!            │
//!            └── otherwise ──► load ─► chunk ─► build_persisted ──► IndexHandle
//! ```
//!
//! Building is incremental: chunks whose ID already exists with the same
//! hash are left alone, changed or new chunks are embedded in batches, and
//! entries whose chunk no longer exists are removed. A collection counts as
//! built only once a pass finishes; an interrupted build is refused by
//! [`IndexHandle::open`] until a later build completes it. `rebuild_persisted`
//! deletes the index directory first.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::chunk::chunk_documents;
use crate::config::{Config, IndexConfig};
use crate::db;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::loader::try_load_documents;
use crate::models::{Chunk, IndexEntry, RetrievedChunk};
use crate::search::{self, RetrievalParams};
use crate::store::sqlite::SqliteStore;
use crate::store::{CollectionInfo, VectorStore, COSINE};

/// Why a persisted index cannot be used.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no index at {}; run `assist index build`", .0.display())]
    Missing(PathBuf),
    #[error("index directory {} is empty; run `assist index build`", .0.display())]
    Empty(PathBuf),
    #[error("index at {} is unreadable: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("collection '{0}' not found in the index")]
    UnknownCollection(String),
    #[error("collection '{0}' has no entries")]
    EmptyCollection(String),
    #[error(
        "collection '{0}' was not fully built; run `assist index build` to finish it \
         or `assist index rebuild` to start over"
    )]
    Incomplete(String),
    #[error("collection '{collection}' uses the '{metric}' metric; only cosine is supported")]
    UnsupportedMetric { collection: String, metric: String },
    #[error(
        "collection '{collection}' was embedded with {indexed_model} ({indexed_dims} dims) \
         but the configured embedder is {model} ({dims} dims); run `assist index rebuild`"
    )]
    EmbedderMismatch {
        collection: String,
        indexed_model: String,
        indexed_dims: usize,
        model: String,
        dims: usize,
    },
    #[error("index store error: {0:#}")]
    Store(anyhow::Error),
}

/// Counts from one build pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub chunks: usize,
    pub embedded: usize,
    pub unchanged: usize,
    pub removed: u64,
}

/// Summary reported by `assist index status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStatus {
    pub collection: String,
    pub model: String,
    pub dims: usize,
    pub entries: u64,
    pub documents: u64,
}

#[derive(Clone)]
pub struct IndexHandle {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: CollectionInfo,
}

impl IndexHandle {
    /// Embed and persist `chunks` under `collection`.
    ///
    /// An existing collection must have been built by the same embedder.
    pub async fn build(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: &str,
        chunks: &[Chunk],
        batch_size: usize,
    ) -> Result<(Self, BuildStats)> {
        if chunks.is_empty() {
            bail!("nothing to index: the documents produced no chunks");
        }

        let info = CollectionInfo {
            name: collection.to_string(),
            metric: COSINE.to_string(),
            model: embedder.model_name().to_string(),
            dims: embedder.dims(),
        };

        if let Some(existing) = store.get_collection(collection).await? {
            check_compatible(&existing, embedder.as_ref())?;
        }
        store.create_collection(&info).await?;
        store.set_complete(collection, false).await?;

        let indexed = store.entry_hashes(collection).await?;
        let pending: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| indexed.get(&c.id) != Some(&c.hash))
            .collect();

        let mut stats = BuildStats {
            chunks: chunks.len(),
            unchanged: chunks.len() - pending.len(),
            ..BuildStats::default()
        };

        for batch in pending.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                );
            }

            let entries: Vec<IndexEntry> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexEntry::from_chunk(chunk, vector))
                .collect();
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != info.dims) {
                bail!(
                    "embedding for {} has {} dims, expected {}",
                    bad.chunk_id,
                    bad.vector.len(),
                    info.dims
                );
            }

            store.upsert_entries(collection, &entries).await?;
            stats.embedded += entries.len();
            tracing::debug!("embedded {}/{} chunks", stats.embedded, pending.len());
        }

        let current: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let vanished: Vec<String> = indexed
            .keys()
            .filter(|id| !current.contains(id.as_str()))
            .cloned()
            .collect();
        if !vanished.is_empty() {
            stats.removed = store.delete_entries(collection, &vanished).await?;
        }
        store.set_complete(collection, true).await?;

        tracing::info!(
            "index '{}': {} chunks, {} embedded, {} unchanged, {} removed",
            collection,
            stats.chunks,
            stats.embedded,
            stats.unchanged,
            stats.removed
        );

        let handle = Self {
            store,
            embedder,
            collection: info,
        };
        Ok((handle, stats))
    }

    /// Reopen an existing collection without embedding anything.
    pub async fn open(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: &str,
    ) -> Result<Self, IndexError> {
        let info = store
            .get_collection(collection)
            .await
            .map_err(IndexError::Store)?
            .ok_or_else(|| IndexError::UnknownCollection(collection.to_string()))?;

        check_compatible(&info, embedder.as_ref())?;

        let complete = store
            .is_complete(collection)
            .await
            .map_err(IndexError::Store)?;
        if !complete {
            return Err(IndexError::Incomplete(collection.to_string()));
        }

        let entries = store
            .count_entries(collection)
            .await
            .map_err(IndexError::Store)?;
        if entries == 0 {
            return Err(IndexError::EmptyCollection(collection.to_string()));
        }

        tracing::info!(
            "opened index '{}' ({} entries, {})",
            collection,
            entries,
            info.model
        );

        Ok(Self {
            store,
            embedder,
            collection: info,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection.name
    }

    /// Up to `params.k` chunks relevant to `query`, best first.
    pub async fn retrieve(
        &self,
        query: &str,
        params: &RetrievalParams,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_vec = embed_query(self.embedder.as_ref(), query)
            .await
            .context("failed to embed query")?;

        let candidates = self
            .store
            .nearest(
                &self.collection.name,
                &query_vec,
                params.fetch_k.max(params.k),
            )
            .await?;

        let selected = search::select(candidates, params);
        tracing::debug!("retrieved {} chunks for {:?}", selected.len(), query);

        Ok(selected
            .into_iter()
            .map(|scored| RetrievedChunk {
                chunk_id: scored.entry.chunk_id,
                document_id: scored.entry.document_id,
                text: scored.entry.text,
                metadata: scored.entry.metadata,
                score: scored.score,
            })
            .collect())
    }

    pub async fn status(&self) -> Result<IndexStatus> {
        let name = &self.collection.name;
        Ok(IndexStatus {
            collection: name.clone(),
            model: self.collection.model.clone(),
            dims: self.collection.dims,
            entries: self.store.count_entries(name).await?,
            documents: self.store.count_documents(name).await?,
        })
    }
}

fn check_compatible(
    info: &CollectionInfo,
    embedder: &dyn EmbeddingProvider,
) -> Result<(), IndexError> {
    if info.metric != COSINE {
        return Err(IndexError::UnsupportedMetric {
            collection: info.name.clone(),
            metric: info.metric.clone(),
        });
    }
    if info.model != embedder.model_name() || info.dims != embedder.dims() {
        return Err(IndexError::EmbedderMismatch {
            collection: info.name.clone(),
            indexed_model: info.model.clone(),
            indexed_dims: info.dims,
            model: embedder.model_name().to_string(),
            dims: embedder.dims(),
        });
    }
    Ok(())
}

/// Whether `dir` exists and holds at least one entry.
pub fn index_present(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Open the on-disk index described by `config`.
pub async fn open_persisted(
    config: &IndexConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<IndexHandle, IndexError> {
    let dir = &config.path;
    if !dir.exists() {
        return Err(IndexError::Missing(dir.clone()));
    }
    if !index_present(dir) {
        return Err(IndexError::Empty(dir.clone()));
    }

    let store = SqliteStore::open_existing(dir)
        .await
        .map_err(|e| IndexError::Corrupt {
            path: db::index_file(dir),
            reason: format!("{:#}", e),
        })?;

    IndexHandle::open(Arc::new(store), embedder, &config.collection).await
}

/// Load, chunk and index the docs directory into the on-disk index.
pub async fn build_persisted(
    config: &Config,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<(IndexHandle, BuildStats)> {
    let documents = try_load_documents(&config.docs)?;
    let chunks = chunk_documents(&documents, &config.chunking);
    tracing::info!(
        "split {} documents into {} chunks",
        documents.len(),
        chunks.len()
    );
    if chunks.is_empty() {
        bail!(
            "nothing to index: the documents in {} contain no text",
            config.docs.dir.display()
        );
    }

    let store = SqliteStore::create(&config.index.path)
        .await
        .with_context(|| format!("failed to create index at {}", config.index.path.display()))?;

    IndexHandle::build(
        Arc::new(store),
        embedder,
        &config.index.collection,
        &chunks,
        config.embedding.batch_size,
    )
    .await
}

/// Delete the on-disk index, then build it from scratch.
pub async fn rebuild_persisted(
    config: &Config,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<(IndexHandle, BuildStats)> {
    let dir = &config.index.path;
    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("failed to remove {}", dir.display()))?;
        tracing::info!("removed index at {}", dir.display());
    }
    build_persisted(config, embedder).await
}

/// Reopen the index if one is on disk, otherwise build it.
pub async fn prepare(
    config: &Config,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<IndexHandle> {
    if index_present(&config.index.path) {
        tracing::info!("loading index from {}", config.index.path.display());
        Ok(open_persisted(&config.index, embedder).await?)
    } else {
        tracing::info!("no index at {}; building", config.index.path.display());
        let (handle, _) = build_persisted(config, embedder).await?;
        Ok(handle)
    }
}
