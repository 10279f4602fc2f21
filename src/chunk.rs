//! Recursive, overlap-preserving text chunker.
//!
//! Splits each document's text into [`Chunk`]s of at most `max_chars`
//! characters. Splitting prefers the coarsest structural boundary present in
//! the text (paragraph, line, sentence, word) and only falls back to hard
//! character splits for unbroken runs. Adjacent pieces are merged greedily up
//! to the limit, and consecutive chunks of the same document share up to
//! `overlap_chars` characters of trailing context.
//!
//! Lengths are measured in `char`s, not bytes. Chunk IDs are derived from the
//! document ID and position, and each chunk carries a SHA-256 hash of its text
//! for staleness detection in the index.

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};

/// Boundaries tried in order; the empty separator splits into characters.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Chunk every document, in document order. No chunk spans two documents.
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| chunk_document(doc, config))
        .collect()
}

/// Chunk a single document. Positions are contiguous from 0.
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    split_text(&document.raw_text, config.max_chars, config.overlap_chars)
        .into_iter()
        .enumerate()
        .map(|(position, text)| make_chunk(document, position, text))
        .collect()
}

/// Split `text` into overlapping pieces of at most `max_chars` characters.
///
/// Whitespace-only input yields no pieces.
pub fn split_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let splitter = Splitter {
        max_chars,
        overlap_chars,
    };
    splitter.split(text, SEPARATORS)
}

struct Splitter {
    max_chars: usize,
    overlap_chars: usize,
}

impl Splitter {
    fn split(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Pick the first separator present in the text.
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<String> = Vec::new();

        for piece in splits {
            if char_len(&piece) < self.max_chars {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split(&piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }

        chunks
    }

    /// Greedily join pieces with `separator`, keeping up to `overlap_chars`
    /// of the previous chunk's tail at the start of the next one.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &[&str], total: usize| {
                total + len + if window.is_empty() { 0 } else { sep_len }
            };

            if joined_len(&window, total) > self.max_chars {
                if !window.is_empty() {
                    push_trimmed(&mut chunks, &window.join(separator));

                    while total > self.overlap_chars
                        || (joined_len(&window, total) > self.max_chars && total > 0)
                    {
                        let removed = char_len(window[0]) + if window.len() > 1 { sep_len } else { 0 };
                        total -= removed;
                        window.remove(0);
                    }
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push(piece.as_str());
        }

        push_trimmed(&mut chunks, &window.join(separator));
        chunks
    }
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(document: &Document, position: usize, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}#{}", document.id, position),
        document_id: document.id.clone(),
        position,
        text,
        hash,
        metadata: document.metadata.clone(),
    }
}
