use async_trait::async_trait;
use ragdb_core::config::{Config, IndexBackend, Settings};
use ragdb_core::traits::{IndexGateway, IndexMatch, IndexRecord, IndexStats, RerankCandidate, RerankHit};
use ragdb_core::types::{IndexKind, Metadata, Vector};
use ragdb_core::Result;
use ragdb_embed::{get_default_dense_encoder, load_sparse_encoder};
use ragdb_hybrid::{HybridSearchRepository, RepositoryConfig, VectorStore};
use ragdb_index::{MemoryGateway, PineconeGateway};
use tracing::info;

/// The configured index backend.
pub enum Gateway {
    Pinecone(PineconeGateway),
    Memory(MemoryGateway),
}

#[async_trait]
impl IndexGateway for Gateway {
    async fn upsert(&self, kind: IndexKind, records: Vec<IndexRecord>) -> Result<usize> {
        match self { Gateway::Pinecone(g) => g.upsert(kind, records).await, Gateway::Memory(g) => g.upsert(kind, records).await }
    }

    async fn query(&self, kind: IndexKind, vector: Vector, top_k: usize, filter: Option<&Metadata>) -> Result<Vec<IndexMatch>> {
        match self {
            Gateway::Pinecone(g) => g.query(kind, vector, top_k, filter).await,
            Gateway::Memory(g) => g.query(kind, vector, top_k, filter).await,
        }
    }

    async fn rerank(&self, query: &str, candidates: &[RerankCandidate], rank_field: &str, top_n: usize) -> Result<Vec<RerankHit>> {
        match self {
            Gateway::Pinecone(g) => g.rerank(query, candidates, rank_field, top_n).await,
            Gateway::Memory(g) => g.rerank(query, candidates, rank_field, top_n).await,
        }
    }

    async fn describe(&self, kind: IndexKind) -> Result<IndexStats> {
        match self { Gateway::Pinecone(g) => g.describe(kind).await, Gateway::Memory(g) => g.describe(kind).await }
    }
}

pub async fn build_store(config: &Config, settings: &Settings) -> Result<VectorStore<Gateway>> {
    let dense = get_default_dense_encoder(&settings.embedding)?;
    let sparse = load_sparse_encoder(&settings.sparse, &config.resolve_path(&settings.sparse.tokenizer_path))?;
    let gateway = match settings.index.backend {
        IndexBackend::Pinecone => Gateway::Pinecone(PineconeGateway::connect(&settings.index, &settings.rerank, settings.embedding.dimension).await?),
        IndexBackend::Memory => Gateway::Memory(MemoryGateway::with_names(&settings.index.dense_name, &settings.index.sparse_name, settings.embedding.dimension)),
    };
    info!(backend = ?settings.index.backend, strategy = %settings.search.default_strategy, "vector store ready");
    let repository = HybridSearchRepository::new(dense, Box::new(sparse), gateway, RepositoryConfig::from_settings(settings));
    let timeout = settings.search.timeout_secs.map(std::time::Duration::from_secs);
    Ok(VectorStore::new(repository, settings.search.default_strategy).with_timeout(timeout))
}
