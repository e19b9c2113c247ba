use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ChunkId, DenseVector, IndexKind, Metadata, SparseVector, Vector};

/// One encoder output, positionally aligned with its input text.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded<V> {
    pub text: String,
    pub vector: V,
    /// Dense length, or number of non-zero entries for sparse vectors.
    pub dimension: usize,
}

/// Converts text into one vector representation.
///
/// Implementations are stateless after construction, return exactly one
/// output per input in input order, and are deterministic for a given text.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    type Vector: Send + Sync;

    fn kind(&self) -> IndexKind;
    async fn encode(&self, texts: &[String]) -> Result<Vec<Encoded<Self::Vector>>>;
}

pub type DenseEncoder = dyn TextEncoder<Vector = DenseVector>;
pub type SparseEncoder = dyn TextEncoder<Vector = SparseVector>;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: ChunkId,
    pub vector: Vector,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub id: ChunkId,
    /// Native similarity of the index that produced the match.
    pub score: f32,
    pub metadata: Metadata,
}

/// A document submitted for reranking. `fields` must contain the rank field.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankCandidate {
    pub id: ChunkId,
    pub fields: Metadata,
}

/// Reranker output: position in the submitted candidate list plus a
/// relevance score in [0,1], unrelated to index similarity scales.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankHit {
    pub index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub name: String,
    pub dimension: Option<usize>,
    pub record_count: u64,
}

/// Contract of the external vector/rerank service.
///
/// `upsert` is idempotent by id and accepts lists of any size; `query`
/// returns the best matches by the index's own metric; every call may fail.
#[async_trait]
pub trait IndexGateway: Send + Sync {
    async fn upsert(&self, kind: IndexKind, records: Vec<IndexRecord>) -> Result<usize>;
    async fn query(&self, kind: IndexKind, vector: Vector, top_k: usize, filter: Option<&Metadata>) -> Result<Vec<IndexMatch>>;
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate], rank_field: &str, top_n: usize) -> Result<Vec<RerankHit>>;
    async fn describe(&self, kind: IndexKind) -> Result<IndexStats>;
}

#[async_trait]
impl<T: IndexGateway + ?Sized> IndexGateway for std::sync::Arc<T> {
    async fn upsert(&self, kind: IndexKind, records: Vec<IndexRecord>) -> Result<usize> { (**self).upsert(kind, records).await }
    async fn query(&self, kind: IndexKind, vector: Vector, top_k: usize, filter: Option<&Metadata>) -> Result<Vec<IndexMatch>> {
        (**self).query(kind, vector, top_k, filter).await
    }
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate], rank_field: &str, top_n: usize) -> Result<Vec<RerankHit>> {
        (**self).rerank(query, candidates, rank_field, top_n).await
    }
    async fn describe(&self, kind: IndexKind) -> Result<IndexStats> { (**self).describe(kind).await }
}
