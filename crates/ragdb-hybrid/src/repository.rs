use futures::stream::{self, StreamExt};
use ragdb_core::config::{RerankFallback, RerankSettings, Settings};
use ragdb_core::traits::{DenseEncoder, IndexGateway, IndexRecord, SparseEncoder};
use ragdb_core::types::{DocumentChunk, IndexKind, SearchQuery, SearchResult, SearchScore, SearchStrategy, Vector};
use ragdb_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::merge::{apply_rerank, merge_results, rank_merged, rerank_candidates};

#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub rerank: RerankSettings,
    pub upsert_batch_size: usize,
    pub upsert_concurrency: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self { Self { rerank: RerankSettings::default(), upsert_batch_size: 100, upsert_concurrency: 4 } }
}

impl RepositoryConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            rerank: settings.rerank.clone(),
            upsert_batch_size: settings.index.upsert_batch_size,
            upsert_concurrency: settings.index.upsert_concurrency,
        }
    }
}

/// Per-call switches for [`HybridSearchRepository::hybrid_search_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridOptions {
    pub apply_reranking: bool,
    /// Upper bound on candidates the reranker returns; 0 means all of them.
    pub top_k: usize,
}

impl HybridOptions {
    pub fn from_settings(rerank: &RerankSettings) -> Self { Self { apply_reranking: rerank.enabled, top_k: rerank.top_k } }
}

pub struct HybridSearchRepository<G> where G: IndexGateway {
    dense: Box<DenseEncoder>,
    sparse: Box<SparseEncoder>,
    gateway: G,
    config: RepositoryConfig,
}

impl<G> HybridSearchRepository<G> where G: IndexGateway {
    pub fn new(dense: Box<DenseEncoder>, sparse: Box<SparseEncoder>, gateway: G, config: RepositoryConfig) -> Self {
        Self { dense, sparse, gateway, config }
    }

    pub fn gateway(&self) -> &G { &self.gateway }

    pub fn supported_strategies(&self) -> &'static [SearchStrategy] { &SearchStrategy::ALL }

    /// Encode and upsert chunks into both indexes. Returns the number of
    /// chunks stored. Any encoder or batch failure fails the whole call;
    /// ids are stable so a retry overwrites instead of duplicating.
    pub async fn store(&self, chunks: &[DocumentChunk]) -> Result<usize> {
        if chunks.is_empty() {
            debug!("store called with no chunks");
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let (dense, sparse) = tokio::try_join!(self.dense.encode(&texts), self.sparse.encode(&texts))?;
        if dense.len() != chunks.len() || sparse.len() != chunks.len() {
            return Err(Error::Encoder(format!(
                "encoder output count mismatch: {} chunks, {} dense, {} sparse",
                chunks.len(),
                dense.len(),
                sparse.len()
            )));
        }

        let mut dense_records = Vec::with_capacity(chunks.len());
        let mut sparse_records = Vec::with_capacity(chunks.len());
        for ((chunk, d), s) in chunks.iter().zip(dense).zip(sparse) {
            let id = chunk.identity();
            let metadata = chunk.stored_metadata();
            dense_records.push(IndexRecord { id: id.clone(), vector: Vector::Dense(d.vector), metadata: metadata.clone() });
            sparse_records.push(IndexRecord { id, vector: Vector::Sparse(s.vector), metadata });
        }

        // both indexes finish their batches before any error surfaces
        let (dense_res, sparse_res) =
            tokio::join!(self.upsert_batched(IndexKind::Dense, dense_records), self.upsert_batched(IndexKind::Sparse, sparse_records));
        let (dense_count, sparse_count) = (dense_res?, sparse_res?);
        info!(chunks = chunks.len(), dense = dense_count, sparse = sparse_count, "stored chunks");
        Ok(chunks.len())
    }

    async fn upsert_batched(&self, kind: IndexKind, records: Vec<IndexRecord>) -> Result<usize> {
        let batches: Vec<Vec<IndexRecord>> = records.chunks(self.config.upsert_batch_size.max(1)).map(<[IndexRecord]>::to_vec).collect();
        let batch_count = batches.len();
        let results: Vec<Result<usize>> = stream::iter(batches)
            .map(|batch| self.gateway.upsert(kind, batch))
            .buffer_unordered(self.config.upsert_concurrency.max(1))
            .collect()
            .await;

        let mut upserted = 0usize;
        let mut first_error = None;
        for r in results {
            match r {
                Ok(n) => upserted += n,
                Err(e) => {
                    warn!(index = %kind, error = %e, "upsert batch failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error { return Err(e); }
        debug!(index = %kind, batches = batch_count, upserted, "upsert complete");
        Ok(upserted)
    }

    /// Dispatch on `query.strategy`. The query is validated before any
    /// collaborator is called.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        query.validate()?;
        match query.strategy {
            SearchStrategy::Dense => self.query_dense(query).await,
            SearchStrategy::Sparse => self.query_sparse(query).await,
            SearchStrategy::Hybrid => self.hybrid_search(query).await,
        }
    }

    pub async fn dense_search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        query.validate()?;
        self.query_dense(query).await
    }

    pub async fn sparse_search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        query.validate()?;
        self.query_sparse(query).await
    }

    pub async fn hybrid_search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        self.hybrid_search_with(query, HybridOptions::from_settings(&self.config.rerank)).await
    }

    /// Merge dense and sparse results, then optionally rerank and keep the
    /// candidates above the relevance threshold.
    ///
    /// An empty return after reranking means nothing cleared the threshold,
    /// unless the `merged` fallback is configured.
    pub async fn hybrid_search_with(&self, query: &SearchQuery, options: HybridOptions) -> Result<Vec<SearchResult>> {
        query.validate()?;
        let (dense, sparse) = tokio::try_join!(self.query_dense(query), self.query_sparse(query))?;
        let (dense_hits, sparse_hits) = (dense.len(), sparse.len());
        let merged = merge_results(dense, sparse);
        debug!(dense = dense_hits, sparse = sparse_hits, merged = merged.len(), "merged hybrid results");

        if merged.is_empty() { return Ok(Vec::new()); }
        if !options.apply_reranking { return Ok(rank_merged(merged, query.max_results)); }

        let rerank = &self.config.rerank;
        let candidates = rerank_candidates(&merged);
        let top_n = if options.top_k == 0 { candidates.len() } else { options.top_k };
        let hits = self.gateway.rerank(&query.text, &candidates, &rerank.rank_field, top_n).await?;
        let results = apply_rerank(&merged, &hits, rerank.threshold, query.max_results)?;
        info!(candidates = candidates.len(), reranked = hits.len(), kept = results.len(), threshold = rerank.threshold, "reranked");

        if results.is_empty() && rerank.fallback == RerankFallback::Merged {
            info!("no candidate above threshold, returning merged ranking");
            return Ok(rank_merged(merged, query.max_results));
        }
        Ok(results)
    }

    async fn query_dense(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let vector = self
            .dense
            .encode(std::slice::from_ref(&query.text))
            .await?
            .pop()
            .ok_or_else(|| Error::Encoder("dense encoder returned no vector for the query".into()))?
            .vector;
        let matches = self.gateway.query(IndexKind::Dense, Vector::Dense(vector), query.max_results, query.filters.as_ref()).await?;
        debug!(matches = matches.len(), "dense search");
        Ok(matches
            .into_iter()
            .map(|m| SearchResult {
                document: DocumentChunk::from_stored(m.id, m.metadata),
                score: SearchScore::Dense { score: m.score },
                strategy_used: SearchStrategy::Dense,
            })
            .collect())
    }

    async fn query_sparse(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let vector = self
            .sparse
            .encode(std::slice::from_ref(&query.text))
            .await?
            .pop()
            .ok_or_else(|| Error::Encoder("sparse encoder returned no vector for the query".into()))?
            .vector;
        // only reserved or unknown tokens: nothing can overlap
        if vector.is_empty() {
            debug!("sparse query has no terms, skipping index");
            return Ok(Vec::new());
        }
        let matches = self.gateway.query(IndexKind::Sparse, Vector::Sparse(vector), query.max_results, query.filters.as_ref()).await?;
        debug!(matches = matches.len(), "sparse search");
        Ok(matches
            .into_iter()
            .map(|m| SearchResult {
                document: DocumentChunk::from_stored(m.id, m.metadata),
                score: SearchScore::Sparse { score: m.score },
                strategy_used: SearchStrategy::Sparse,
            })
            .collect())
    }
}
