//! Core data models.
//!
//! These types flow from the loader through the chunker into the index, and
//! from the chat session into the orchestrator.

use serde::{Deserialize, Serialize};

/// Metadata carried from a document onto each of its chunks and index entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMetadata {
    /// Feature identifier: the Markdown filename without its extension.
    pub feature: String,
    /// Path of the source file relative to the docs directory.
    pub source: String,
}

/// A loaded Markdown document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Relative path inside the docs directory.
    pub id: String,
    pub feature_name: String,
    /// Plain text with the `### Feature:` heading prepended.
    pub raw_text: String,
    pub metadata: DocMetadata,
}

/// A bounded slice of a document's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `<document id>#<position>`; stable across runs.
    pub id: String,
    pub document_id: String,
    pub position: usize,
    pub text: String,
    /// SHA-256 of `text`, used to detect stale embeddings.
    pub hash: String,
    pub metadata: DocMetadata,
}

/// A chunk with its embedding vector, as persisted by a store.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub document_id: String,
    pub position: usize,
    pub text: String,
    pub hash: String,
    pub metadata: DocMetadata,
    pub vector: Vec<f32>,
}

impl IndexEntry {
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            position: chunk.position,
            text: chunk.text.clone(),
            hash: chunk.hash.clone(),
            metadata: chunk.metadata.clone(),
            vector,
        }
    }
}

/// A chunk returned by retrieval, in rank order.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub metadata: DocMetadata,
    /// Cosine similarity to the query.
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
