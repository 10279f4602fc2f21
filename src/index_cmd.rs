use anyhow::Result;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding;
use crate::index::{self, BuildStats};
use crate::loader::try_load_documents;

/// Build or incrementally refresh the on-disk index.
pub async fn run_index_build(config: &Config) -> Result<()> {
    let embedder = embedding::create_provider(&config.embedding)?;
    let (handle, stats) = index::build_persisted(config, embedder).await?;
    print_stats("index build", handle.collection(), &stats);
    Ok(())
}

/// Delete the on-disk index and build it again from the docs directory.
pub async fn run_index_rebuild(config: &Config) -> Result<()> {
    let embedder = embedding::create_provider(&config.embedding)?;
    let (handle, stats) = index::rebuild_persisted(config, embedder).await?;
    print_stats("index rebuild", handle.collection(), &stats);
    Ok(())
}

pub async fn run_index_status(config: &Config) -> Result<()> {
    let embedder = embedding::create_provider(&config.embedding)?;
    let handle = index::open_persisted(&config.index, embedder).await?;
    let status = handle.status().await?;

    println!("index status");
    println!("  path: {}", config.index.path.display());
    println!("  collection: {}", status.collection);
    println!("  model: {} ({} dims)", status.model, status.dims);
    println!("  documents: {}", status.documents);
    println!("  entries: {}", status.entries);
    Ok(())
}

/// List the documents the loader finds, with their chunk counts.
pub fn run_docs(config: &Config) -> Result<()> {
    let documents = try_load_documents(&config.docs)?;

    println!("{:<40} {:<32} CHUNKS", "DOCUMENT", "FEATURE");
    let mut total = 0usize;
    for doc in &documents {
        let chunks = chunk_document(doc, &config.chunking).len();
        total += chunks;
        println!("{:<40} {:<32} {}", doc.id, doc.feature_name, chunks);
    }
    println!();
    println!("{} documents, {} chunks", documents.len(), total);
    Ok(())
}

fn print_stats(title: &str, collection: &str, stats: &BuildStats) {
    println!("{}", title);
    println!("  collection: {}", collection);
    println!("  chunks: {}", stats.chunks);
    println!("  embedded: {}", stats.embedded);
    println!("  unchanged: {}", stats.unchanged);
    println!("  removed: {}", stats.removed);
}
