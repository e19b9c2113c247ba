use std::cmp::Ordering;
use std::collections::HashMap;

use ragdb_core::traits::{RerankCandidate, RerankHit};
use ragdb_core::types::{ChunkId, SearchResult, SearchScore, SearchStrategy};
use ragdb_core::{Error, Result};

/// Deduplicate dense and sparse results by chunk id.
///
/// A chunk's combined score is the higher of its single-strategy scores; the
/// two are compared, never summed. Both raw components are kept whichever
/// strategy reported first. Output is in first-seen order.
pub fn merge_results(dense: Vec<SearchResult>, sparse: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut merged: Vec<SearchResult> = Vec::new();
    let mut by_id: HashMap<ChunkId, usize> = HashMap::new();

    for candidate in dense.into_iter().chain(sparse) {
        let Some(original) = candidate.score.original_score() else { continue };
        let (dense_score, sparse_score) = (candidate.score.dense_score(), candidate.score.sparse_score());

        match by_id.get(&candidate.document.id) {
            None => {
                by_id.insert(candidate.document.id.clone(), merged.len());
                merged.push(SearchResult {
                    document: candidate.document,
                    score: SearchScore::Merged { dense: dense_score, sparse: sparse_score, combined: original },
                    strategy_used: SearchStrategy::Hybrid,
                });
            }
            Some(&pos) => {
                let entry = &mut merged[pos];
                let SearchScore::Merged { dense, sparse, combined } = entry.score else { continue };
                let dense = dense.or(dense_score);
                let sparse = sparse.or(sparse_score);
                if original > combined {
                    entry.document = candidate.document;
                    entry.score = SearchScore::Merged { dense, sparse, combined: original };
                } else {
                    entry.score = SearchScore::Merged { dense, sparse, combined };
                }
            }
        }
    }
    merged
}

/// Candidates for the reranker, positionally aligned with `merged`. Each
/// carries the chunk's stored fields so any rank field can be selected.
pub fn rerank_candidates(merged: &[SearchResult]) -> Vec<RerankCandidate> {
    merged.iter().map(|r| RerankCandidate { id: r.document.id.clone(), fields: r.document.stored_metadata() }).collect()
}

/// Keep hits scoring strictly above `threshold`, in the reranker's order,
/// re-scored with the rerank score alone.
pub fn apply_rerank(merged: &[SearchResult], hits: &[RerankHit], threshold: f32, max_results: usize) -> Result<Vec<SearchResult>> {
    let mut out = Vec::new();
    for hit in hits {
        let source = merged
            .get(hit.index)
            .ok_or_else(|| Error::Rerank(format!("rerank hit references candidate {} of {}", hit.index, merged.len())))?;
        if hit.score > threshold {
            out.push(SearchResult { document: source.document.clone(), score: SearchScore::Reranked { score: hit.score }, strategy_used: SearchStrategy::Hybrid });
        }
    }
    out.truncate(max_results);
    Ok(out)
}

/// Merged results by combined score descending, ties by id.
pub fn rank_merged(mut merged: Vec<SearchResult>, max_results: usize) -> Vec<SearchResult> {
    merged.sort_by(|a, b| {
        b.relevance_score().partial_cmp(&a.relevance_score()).unwrap_or(Ordering::Equal).then_with(|| a.document.id.cmp(&b.document.id))
    });
    merged.truncate(max_results);
    merged
}
