//! Markdown document loader.
//!
//! Walks the docs directory, extracts plain text from every Markdown file and
//! tags it with a feature name taken from the filename (`leave_policy.md` →
//! `leave_policy`). The feature name is also prepended to the text as a
//! heading so that it participates in embedding and retrieval.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::DocsConfig;
use crate::extract::markdown_to_text;
use crate::models::{DocMetadata, Document};

/// Why no documents could be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error loading markdown files from {}: {source}", dir.display())]
    Unreadable {
        dir: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error(
        "no markdown files found in {}; add .md files (e.g. add_new_employee.md) to proceed",
        dir.display()
    )]
    NoDocuments { dir: PathBuf },
}

/// Load every matching Markdown file under `config.dir`.
///
/// The directory is created when it does not exist, which then yields
/// [`LoadError::NoDocuments`]. Files that cannot be read are skipped with a
/// warning. Documents are sorted by relative path.
pub fn try_load_documents(config: &DocsConfig) -> Result<Vec<Document>, LoadError> {
    let root = &config.dir;
    let unreadable = |source: anyhow::Error| LoadError::Unreadable {
        dir: root.clone(),
        source,
    };

    if !root.exists() {
        std::fs::create_dir_all(root).map_err(|e| unreadable(e.into()))?;
        tracing::info!("created docs directory {}", root.display());
    }

    let include_set = build_globset(&config.include_globs).map_err(unreadable)?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes).map_err(unreadable)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry.map_err(|e| unreadable(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match load_file(path, &rel_str) {
            Ok(doc) => documents.push(doc),
            Err(e) => tracing::warn!("skipping {}: {:#}", path.display(), e),
        }
    }

    if documents.is_empty() {
        return Err(LoadError::NoDocuments { dir: root.clone() });
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    tracing::info!(
        "loaded {} documents from {}",
        documents.len(),
        root.display()
    );
    Ok(documents)
}

/// Load documents, reporting failures instead of propagating them.
///
/// Returns an empty set when the directory is unreadable or holds no
/// Markdown files; callers must treat that as "no index can be built".
pub fn load_documents(config: &DocsConfig) -> Vec<Document> {
    match try_load_documents(config) {
        Ok(documents) => documents,
        Err(e) => {
            tracing::error!("{}", e);
            Vec::new()
        }
    }
}

/// Feature identifier for a Markdown path: the file name without extension.
pub fn feature_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn load_file(path: &Path, relative_path: &str) -> Result<Document> {
    let source = std::fs::read_to_string(path)?;
    let feature = feature_name(path);
    let text = markdown_to_text(&source);

    Ok(Document {
        id: relative_path.to_string(),
        raw_text: format!("### Feature: {}\n\n{}", feature, text),
        feature_name: feature.clone(),
        metadata: DocMetadata {
            feature,
            source: relative_path.to_string(),
        },
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
