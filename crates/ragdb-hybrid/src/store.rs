//! Ingestion/query facade over [`HybridSearchRepository`].

use std::future::Future;
use std::time::Duration;

use ragdb_core::traits::{IndexGateway, IndexStats};
use ragdb_core::types::{DocumentChunk, IndexKind, Metadata, RawChunk, SearchQuery, SearchResult, SearchStrategy};
use ragdb_core::{Error, Result};
use tracing::info;

use crate::repository::HybridSearchRepository;

pub struct VectorStore<G> where G: IndexGateway {
    repository: HybridSearchRepository<G>,
    strategy: SearchStrategy,
    timeout: Option<Duration>,
}

impl<G> VectorStore<G> where G: IndexGateway {
    pub fn new(repository: HybridSearchRepository<G>, strategy: SearchStrategy) -> Self { Self { repository, strategy, timeout: None } }

    /// Bound every `search_similar` call; exceeding it is [`Error::Timeout`].
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn repository(&self) -> &HybridSearchRepository<G> { &self.repository }

    /// Store the chunks of one source file as `{file_name}_{i}`.
    pub async fn store_documents(&self, chunks: Vec<RawChunk>, file_name: &str) -> Result<usize> {
        let documents: Vec<DocumentChunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, raw)| DocumentChunk {
                id: format!("{}_{}", file_name, i),
                content: raw.content,
                metadata: raw.metadata,
                file_name: Some(file_name.to_string()),
                chunk_index: Some(i),
            })
            .collect();
        let stored = self.repository.store(&documents).await?;
        info!(file = file_name, chunks = stored, "stored documents");
        Ok(stored)
    }

    /// Search with `strategy` (a name such as `"sparse"`) or the current
    /// default. Unknown names are rejected.
    pub async fn search_similar(&self, text: &str, k: usize, strategy: Option<&str>, filters: Option<Metadata>) -> Result<Vec<SearchResult>> {
        let strategy = match strategy { Some(name) => name.parse()?, None => self.strategy };
        let query = SearchQuery::new(text, k, strategy)?.with_filters(filters);
        let results = self.with_deadline(self.repository.search(&query)).await?;
        info!(strategy = %strategy, results = results.len(), "search complete");
        Ok(results)
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| Error::Timeout(limit))?,
            None => fut.await,
        }
    }

    pub fn set_search_strategy(&mut self, name: &str) -> Result<()> {
        self.strategy = name.parse()?;
        info!(strategy = %self.strategy, "default search strategy changed");
        Ok(())
    }

    pub fn current_strategy(&self) -> SearchStrategy { self.strategy }

    pub fn available_strategies(&self) -> Vec<&'static str> { self.repository.supported_strategies().iter().map(SearchStrategy::as_str).collect() }

    pub async fn index_stats(&self) -> Result<[IndexStats; 2]> {
        let gateway = self.repository.gateway();
        let (dense, sparse) = tokio::try_join!(gateway.describe(IndexKind::Dense), gateway.describe(IndexKind::Sparse))?;
        Ok([dense, sparse])
    }
}
