//! Two-phase semantic retrieval: candidate fetch, then exact rescoring.

use crate::error::MemoryError;
use crate::index::{SearchHit, SemanticIndex};
use crate::model::RetrievedItem;
use crate::provider::Embedder;
use crate::similarity::cosine_similarity;
use log::{debug, warn};
use std::sync::Arc;

/// Default number of candidates fetched from the index.
pub const DEFAULT_TOP_K: usize = 5;
/// Default inclusive similarity threshold.
pub const DEFAULT_MIN_SCORE: f64 = 0.65;

/// A search candidate with its exact similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub hit: SearchHit,
    pub score: f64,
}

/// Embeds a query, searches the index, and keeps candidates whose exact
/// cosine similarity clears the threshold.
///
/// Retrieval is best-effort: failures never escape `retrieve`.
#[derive(Clone)]
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    index: SemanticIndex,
}

impl RetrievalEngine {
    pub fn new(embedder: Arc<dyn Embedder>, index: SemanticIndex) -> Self {
        Self { embedder, index }
    }

    /// Retrieve items for `query_text`, in search order.
    ///
    /// Embedding or search failures yield an empty result. A candidate
    /// whose stored vector cannot be read is dropped on its own.
    pub fn retrieve(&self, query_text: &str, top_k: usize, min_score: f64) -> Vec<RetrievedItem> {
        let (query_vector, hits) = match self.fetch_candidates(query_text, top_k) {
            Ok(found) => found,
            Err(err) => {
                warn!("retrieval skipped: {err}");
                return Vec::new();
            }
        };
        let fetched = hits.len();
        let scored = self.rescore(&query_vector, hits);
        let kept = filter_by_threshold(scored, min_score);
        debug!(
            "retrieval finished (candidates={fetched}, kept={}, min_score={min_score})",
            kept.len()
        );
        kept.into_iter().map(into_item).collect()
    }

    /// Phase one: embed and fetch candidates. Backend scores are ignored.
    pub fn fetch_candidates(
        &self,
        query_text: &str,
        top_k: usize,
    ) -> Result<(Vec<f32>, Vec<SearchHit>), MemoryError> {
        let query_vector = self.embedder.embed(query_text)?;
        let hits = self.index.search(&query_vector, top_k)?;
        Ok((query_vector, hits))
    }

    /// Phase two: recompute similarity from the stored vectors.
    pub fn rescore(&self, query_vector: &[f32], hits: Vec<SearchHit>) -> Vec<ScoredCandidate> {
        let mut scored = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.index.get_vector(hit.id) {
                Ok(stored) => {
                    let score = cosine_similarity(query_vector, &stored);
                    scored.push(ScoredCandidate { hit, score });
                }
                Err(err) => {
                    debug!("dropping candidate without readable vector (id={}): {err}", hit.id);
                }
            }
        }
        scored
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }
}

/// Keep candidates with `score >= min_score`, preserving order.
pub fn filter_by_threshold(candidates: Vec<ScoredCandidate>, min_score: f64) -> Vec<ScoredCandidate> {
    candidates
        .into_iter()
        .filter(|candidate| candidate.score >= min_score)
        .collect()
}

/// Citation label for a retrieved point.
pub fn source_label(id: u64, score: f64) -> String {
    format!("memory id:{id} (sim:{score:.3})")
}

fn into_item(candidate: ScoredCandidate) -> RetrievedItem {
    let ScoredCandidate { hit, score } = candidate;
    RetrievedItem {
        id: hit.id,
        text: hit.payload.text(),
        source_label: source_label(hit.id, score),
        score,
    }
}
