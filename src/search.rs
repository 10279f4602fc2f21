//! Candidate selection for retrieval.
//!
//! The index fetches the `fetch_k` nearest entries by cosine similarity;
//! this module narrows them to `k`. With diversity enabled it applies
//! Maximal Marginal Relevance (MMR): each step picks the candidate that
//! maximizes
//!
//! ```text
//! lambda * sim(query, c) - (1 - lambda) * max(sim(c, s) for s in selected)
//! ```
//!
//! so `lambda = 1.0` is pure relevance and `lambda = 0.0` is pure diversity.
//! Without diversity the top `k` by similarity are kept as-is.

use crate::config::RetrievalConfig;
use crate::embedding::cosine_similarity;
use crate::store::ScoredEntry;

/// Retrieval parameters; defaults match [`RetrievalConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub k: usize,
    pub fetch_k: usize,
    pub lambda: f32,
    pub diversity: bool,
}

impl From<&RetrievalConfig> for RetrievalParams {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            k: config.k,
            fetch_k: config.fetch_k.max(config.k),
            lambda: config.lambda,
            diversity: config.diversity,
        }
    }
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

/// Narrow similarity-ordered `candidates` to at most `params.k` entries.
pub fn select(candidates: Vec<ScoredEntry>, params: &RetrievalParams) -> Vec<ScoredEntry> {
    if !params.diversity {
        let mut top = candidates;
        top.truncate(params.k);
        return top;
    }

    let order = {
        let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
        let vectors: Vec<&[f32]> = candidates.iter().map(|c| c.entry.vector.as_slice()).collect();
        mmr_order(&scores, &vectors, params.k, params.lambda)
    };

    let mut slots: Vec<Option<ScoredEntry>> = candidates.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots.get_mut(i).and_then(Option::take))
        .collect()
}

/// Indices of the MMR selection, in selection order.
///
/// `query_scores[i]` is the similarity of candidate `i` to the query and
/// `vectors[i]` its embedding. Ties go to the lower index, so candidates
/// should arrive ordered by descending relevance.
pub fn mmr_order(query_scores: &[f32], vectors: &[&[f32]], k: usize, lambda: f32) -> Vec<usize> {
    let n = query_scores.len().min(vectors.len());
    let want = k.min(n);
    let mut selected: Vec<usize> = Vec::with_capacity(want);
    if want == 0 {
        return selected;
    }

    let mut first = 0;
    for i in 1..n {
        if query_scores[i] > query_scores[first] {
            first = i;
        }
    }
    selected.push(first);

    // Highest similarity of each candidate to anything already selected.
    let mut redundancy: Vec<f32> = (0..n)
        .map(|i| cosine_similarity(vectors[i], vectors[first]))
        .collect();

    while selected.len() < want {
        let mut best: Option<(usize, f32)> = None;
        for i in 0..n {
            if selected.contains(&i) {
                continue;
            }
            let score = lambda * query_scores[i] - (1.0 - lambda) * redundancy[i];
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        let Some((pick, _)) = best else { break };
        selected.push(pick);
        for i in 0..n {
            let sim = cosine_similarity(vectors[i], vectors[pick]);
            if sim > redundancy[i] {
                redundancy[i] = sim;
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocMetadata, IndexEntry};

    fn candidate(id: &str, vector: Vec<f32>, score: f32) -> ScoredEntry {
        ScoredEntry {
            entry: IndexEntry {
                chunk_id: id.to_string(),
                document_id: format!("{}.md", id),
                position: 0,
                text: id.to_string(),
                hash: String::new(),
                metadata: DocMetadata {
                    feature: id.to_string(),
                    source: format!("{}.md", id),
                },
                vector,
            },
            score,
        }
    }

    fn ids(entries: &[ScoredEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.entry.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_mmr_prefers_diverse_second_pick() {
        // b is a near-duplicate of a; c is less relevant but different.
        let candidates = vec![
            candidate("a", vec![1.0, 0.0], 0.95),
            candidate("b", vec![0.99, 0.01], 0.94),
            candidate("c", vec![0.0, 1.0], 0.60),
        ];
        let params = RetrievalParams {
            k: 2,
            fetch_k: 3,
            lambda: 0.5,
            diversity: true,
        };
        assert_eq!(ids(&select(candidates, &params)), vec!["a", "c"]);
    }

    #[test]
    fn test_lambda_one_is_pure_relevance() {
        let candidates = vec![
            candidate("a", vec![1.0, 0.0], 0.95),
            candidate("b", vec![0.99, 0.01], 0.94),
            candidate("c", vec![0.0, 1.0], 0.60),
        ];
        let params = RetrievalParams {
            k: 2,
            fetch_k: 3,
            lambda: 1.0,
            diversity: true,
        };
        assert_eq!(ids(&select(candidates, &params)), vec!["a", "b"]);
    }

    #[test]
    fn test_without_diversity_keeps_top_k() {
        let candidates = vec![
            candidate("a", vec![1.0, 0.0], 0.9),
            candidate("b", vec![1.0, 0.0], 0.8),
            candidate("c", vec![0.0, 1.0], 0.7),
        ];
        let params = RetrievalParams {
            k: 2,
            fetch_k: 3,
            lambda: 0.0,
            diversity: false,
        };
        assert_eq!(ids(&select(candidates, &params)), vec!["a", "b"]);
    }

    #[test]
    fn test_never_returns_more_than_k_or_available() {
        let candidates: Vec<ScoredEntry> = (0..4)
            .map(|i| candidate(&format!("c{}", i), vec![i as f32, 1.0], 0.5))
            .collect();
        let params = RetrievalParams {
            k: 6,
            fetch_k: 10,
            lambda: 0.5,
            diversity: true,
        };
        let picked = select(candidates, &params);
        assert_eq!(picked.len(), 4);

        let mut unique = ids(&picked);
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_mmr_order_empty_and_zero_k() {
        assert!(mmr_order(&[], &[], 3, 0.5).is_empty());
        let v = [1.0f32, 0.0];
        assert!(mmr_order(&[0.9], &[&v], 0, 0.5).is_empty());
    }

    #[test]
    fn test_params_from_config_raise_fetch_k() {
        let config = RetrievalConfig {
            k: 8,
            fetch_k: 4,
            ..RetrievalConfig::default()
        };
        let params = RetrievalParams::from(&config);
        assert_eq!(params.k, 8);
        assert_eq!(params.fetch_k, 8);
    }
}
