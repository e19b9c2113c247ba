use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use ragdb_core::traits::{IndexGateway, IndexMatch, IndexRecord, IndexStats, RerankCandidate, RerankHit};
use ragdb_core::types::{ChunkId, IndexKind, Metadata, Vector};
use ragdb_core::{Error, Result};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::filter::matches_filter;

#[derive(Debug, Clone)]
struct StoredRecord {
    vector: Vector,
    metadata: Metadata,
}

#[derive(Default)]
struct CallCounts {
    upsert: [AtomicUsize; 2],
    query: [AtomicUsize; 2],
    rerank: AtomicUsize,
}

fn slot(kind: IndexKind) -> usize { match kind { IndexKind::Dense => 0, IndexKind::Sparse => 1 } }

/// In-process gateway: a cosine dense index, a dot-product sparse index and a
/// lexical reranker. Upserts replace by id.
pub struct MemoryGateway {
    dense_name: String,
    sparse_name: String,
    dimension: usize,
    dense: RwLock<HashMap<ChunkId, StoredRecord>>,
    sparse: RwLock<HashMap<ChunkId, StoredRecord>>,
    calls: CallCounts,
}

impl MemoryGateway {
    pub fn new(dimension: usize) -> Self { Self::with_names("dense", "sparse", dimension) }

    pub fn with_names(dense_name: &str, sparse_name: &str, dimension: usize) -> Self {
        Self {
            dense_name: dense_name.to_string(),
            sparse_name: sparse_name.to_string(),
            dimension,
            dense: RwLock::new(HashMap::new()),
            sparse: RwLock::new(HashMap::new()),
            calls: CallCounts::default(),
        }
    }

    fn index(&self, kind: IndexKind) -> &RwLock<HashMap<ChunkId, StoredRecord>> {
        match kind { IndexKind::Dense => &self.dense, IndexKind::Sparse => &self.sparse }
    }

    pub async fn len(&self, kind: IndexKind) -> usize { self.index(kind).read().await.len() }

    pub fn upsert_calls(&self, kind: IndexKind) -> usize { self.calls.upsert[slot(kind)].load(AtomicOrdering::SeqCst) }
    pub fn query_calls(&self, kind: IndexKind) -> usize { self.calls.query[slot(kind)].load(AtomicOrdering::SeqCst) }
    pub fn rerank_calls(&self) -> usize { self.calls.rerank.load(AtomicOrdering::SeqCst) }

    fn check_vector(&self, kind: IndexKind, vector: &Vector) -> Result<()> {
        if vector.kind() != kind {
            return Err(Error::Index(format!("{} vector sent to {} index", vector.kind(), kind)));
        }
        if let Vector::Dense(v) = vector {
            if v.len() != self.dimension {
                return Err(Error::Index(format!("vector dimension {} does not match index dimension {}", v.len(), self.dimension)));
            }
        }
        Ok(())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

fn similarity(query: &Vector, stored: &Vector) -> Option<f32> {
    match (query, stored) {
        (Vector::Dense(q), Vector::Dense(s)) => Some(cosine(q, s)),
        (Vector::Sparse(q), Vector::Sparse(s)) => Some(q.dot(s)),
        _ => None,
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase).collect()
}

/// Fraction of distinct query terms present in `text`, in [0,1].
pub fn lexical_relevance(query: &str, text: &str) -> f32 {
    let query_terms = terms(query);
    if query_terms.is_empty() { return 0.0; }
    let doc_terms = terms(text);
    query_terms.iter().filter(|t| doc_terms.contains(*t)).count() as f32 / query_terms.len() as f32
}

#[async_trait]
impl IndexGateway for MemoryGateway {
    async fn upsert(&self, kind: IndexKind, records: Vec<IndexRecord>) -> Result<usize> {
        self.calls.upsert[slot(kind)].fetch_add(1, AtomicOrdering::SeqCst);
        for r in &records { self.check_vector(kind, &r.vector)?; }
        let n = records.len();
        let mut index = self.index(kind).write().await;
        for r in records { index.insert(r.id, StoredRecord { vector: r.vector, metadata: r.metadata }); }
        debug!(index = %kind, upserted = n, total = index.len(), "memory upsert");
        Ok(n)
    }

    async fn query(&self, kind: IndexKind, vector: Vector, top_k: usize, filter: Option<&Metadata>) -> Result<Vec<IndexMatch>> {
        self.calls.query[slot(kind)].fetch_add(1, AtomicOrdering::SeqCst);
        self.check_vector(kind, &vector)?;
        let index = self.index(kind).read().await;
        let mut matches: Vec<IndexMatch> = index
            .iter()
            .filter(|(_, r)| filter.map_or(true, |f| matches_filter(&r.metadata, f)))
            .filter_map(|(id, r)| similarity(&vector, &r.vector).map(|score| IndexMatch { id: id.clone(), score, metadata: r.metadata.clone() }))
            // no lexical overlap is no match
            .filter(|m| kind == IndexKind::Dense || m.score > 0.0)
            .collect();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn rerank(&self, query: &str, candidates: &[RerankCandidate], rank_field: &str, top_n: usize) -> Result<Vec<RerankHit>> {
        self.calls.rerank.fetch_add(1, AtomicOrdering::SeqCst);
        let mut hits = Vec::with_capacity(candidates.len());
        for (index, c) in candidates.iter().enumerate() {
            let text = match c.fields.get(rank_field) {
                Some(Value::String(s)) => s,
                _ => return Err(Error::Rerank(format!("candidate '{}' has no text field '{}'", c.id, rank_field))),
            };
            hits.push(RerankHit { index, score: lexical_relevance(query, text) });
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.index.cmp(&b.index)));
        hits.truncate(top_n);
        Ok(hits)
    }

    async fn describe(&self, kind: IndexKind) -> Result<IndexStats> {
        let (name, dimension) = match kind {
            IndexKind::Dense => (self.dense_name.clone(), Some(self.dimension)),
            IndexKind::Sparse => (self.sparse_name.clone(), None),
        };
        Ok(IndexStats { name, dimension, record_count: self.len(kind).await as u64 })
    }
}
