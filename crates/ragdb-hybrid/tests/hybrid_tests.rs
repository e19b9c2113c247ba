use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ragdb_core::config::{RerankFallback, SparseSettings};
use ragdb_core::traits::{IndexGateway, IndexMatch, IndexRecord, IndexStats, RerankCandidate, RerankHit};
use ragdb_core::types::{DocumentChunk, IndexKind, Metadata, RawChunk, ScorePhase, SearchQuery, SearchScore, SearchStrategy, Vector};
use ragdb_core::{Error, Result};
use ragdb_embed::{load_sparse_encoder, HashingEncoder};
use ragdb_hybrid::{HybridOptions, HybridSearchRepository, RepositoryConfig, VectorStore};
use ragdb_index::MemoryGateway;
use serde_json::json;

const DIM: usize = 64;

fn fixture_tokenizer() -> PathBuf { PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../ragdb-embed/tests/fixtures/tokenizer.json") }

fn stored(id: &str, text: &str) -> Metadata {
    DocumentChunk { file_name: Some("notes.txt".into()), ..DocumentChunk::new(id, text) }.stored_metadata()
}

/// Gateway replaying fixed matches and rerank scores, recording every call.
#[derive(Default)]
struct ScriptedGateway {
    dense: Vec<IndexMatch>,
    sparse: Vec<IndexMatch>,
    rerank_scores: Vec<f32>,
    fail_sparse_upsert: bool,
    dense_queries: AtomicUsize,
    sparse_queries: AtomicUsize,
    reranks: AtomicUsize,
    requested_top_n: AtomicUsize,
    upserts: Mutex<Vec<(IndexKind, usize)>>,
}

impl ScriptedGateway {
    fn calls(&self) -> (usize, usize, usize) {
        (self.dense_queries.load(Ordering::SeqCst), self.sparse_queries.load(Ordering::SeqCst), self.reranks.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl IndexGateway for ScriptedGateway {
    async fn upsert(&self, kind: IndexKind, records: Vec<IndexRecord>) -> Result<usize> {
        self.upserts.lock().unwrap().push((kind, records.len()));
        if kind == IndexKind::Sparse && self.fail_sparse_upsert { return Err(Error::Index("sparse index unavailable".into())); }
        Ok(records.len())
    }

    async fn query(&self, kind: IndexKind, _vector: Vector, top_k: usize, _filter: Option<&Metadata>) -> Result<Vec<IndexMatch>> {
        let source = match kind {
            IndexKind::Dense => { self.dense_queries.fetch_add(1, Ordering::SeqCst); &self.dense }
            IndexKind::Sparse => { self.sparse_queries.fetch_add(1, Ordering::SeqCst); &self.sparse }
        };
        Ok(source.iter().take(top_k).cloned().collect())
    }

    async fn rerank(&self, _query: &str, candidates: &[RerankCandidate], _rank_field: &str, top_n: usize) -> Result<Vec<RerankHit>> {
        self.reranks.fetch_add(1, Ordering::SeqCst);
        self.requested_top_n.store(top_n, Ordering::SeqCst);
        let mut hits: Vec<RerankHit> =
            self.rerank_scores.iter().take(candidates.len()).enumerate().map(|(index, &score)| RerankHit { index, score }).collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        hits.truncate(top_n);
        Ok(hits)
    }

    async fn describe(&self, kind: IndexKind) -> Result<IndexStats> { Ok(IndexStats { name: kind.to_string(), dimension: None, record_count: 0 }) }
}

fn repository<G: IndexGateway>(gateway: G, config: RepositoryConfig) -> HybridSearchRepository<G> {
    let sparse = load_sparse_encoder(&SparseSettings::default(), &fixture_tokenizer()).expect("tokenizer fixture");
    HybridSearchRepository::new(Box::new(HashingEncoder::new(DIM)), Box::new(sparse), gateway, config)
}

fn hit(id: &str, text: &str, score: f32) -> IndexMatch { IndexMatch { id: id.into(), score, metadata: stored(id, text) } }

fn query(text: &str, max_results: usize, strategy: SearchStrategy) -> SearchQuery { SearchQuery::new(text, max_results, strategy).unwrap() }

#[tokio::test]
async fn merge_keeps_higher_score_and_both_components() {
    let gateway = ScriptedGateway { dense: vec![hit("a", "cats", 0.4)], sparse: vec![hit("a", "cats", 0.9)], ..Default::default() };
    let repo = repository(gateway, RepositoryConfig::default());

    let options = HybridOptions { apply_reranking: false, top_k: 5 };
    let results = repo.hybrid_search_with(&query("cats", 5, SearchStrategy::Hybrid), options).await.unwrap();
    assert_eq!(results.len(), 1);
    let r = &results[0];
    assert_eq!(r.score.combined_score(), Some(0.9));
    assert_eq!(r.score.dense_score(), Some(0.4));
    assert_eq!(r.score.sparse_score(), Some(0.9));
    assert!(r.score.is_hybrid());
    assert_eq!(r.strategy_used, SearchStrategy::Hybrid);
    assert_eq!(r.document.content, "cats");
    assert_eq!(r.document.file_name.as_deref(), Some("notes.txt"));
    assert_eq!(repo.gateway().calls(), (1, 1, 0));
}

#[tokio::test]
async fn rerank_threshold_keeps_scores_above_cutoff() {
    let gateway = ScriptedGateway {
        dense: vec![hit("a", "a", 0.5), hit("b", "b", 0.4)],
        sparse: vec![hit("c", "c", 3.0), hit("d", "d", 1.0)],
        rerank_scores: vec![0.9, 0.75, 0.65, 0.3],
        ..Default::default()
    };
    let repo = repository(gateway, RepositoryConfig::default());

    let results = repo.hybrid_search(&query("cats", 4, SearchStrategy::Hybrid)).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(results[0].score, SearchScore::Reranked { score: 0.9 });
    assert_eq!(results[1].score.phase(), ScorePhase::Reranked);
    assert_eq!(results[1].score.combined_score(), None);
    assert!(results.iter().all(|r| r.strategy_used == SearchStrategy::Hybrid));
}

#[tokio::test]
async fn all_below_threshold_is_empty_unless_merged_fallback() {
    let script = || ScriptedGateway { dense: vec![hit("a", "a", 0.5)], sparse: vec![hit("b", "b", 2.0)], rerank_scores: vec![0.2, 0.1], ..Default::default() };

    let strict = repository(script(), RepositoryConfig::default());
    let q = query("cats", 5, SearchStrategy::Hybrid);
    assert!(strict.search(&q).await.unwrap().is_empty());
    assert_eq!(strict.gateway().calls().2, 1);

    let mut config = RepositoryConfig::default();
    config.rerank.fallback = RerankFallback::Merged;
    let lenient = repository(script(), config);
    let results = lenient.search(&q).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert_eq!(results[0].score.phase(), ScorePhase::Merged);
}

#[tokio::test]
async fn zero_top_k_reranks_every_candidate() {
    let gateway = ScriptedGateway {
        dense: vec![hit("a", "a", 0.5), hit("b", "b", 0.4)],
        sparse: vec![hit("c", "c", 3.0), hit("d", "d", 1.0)],
        rerank_scores: vec![0.9, 0.8, 0.75, 0.72],
        ..Default::default()
    };
    let repo = repository(gateway, RepositoryConfig::default());

    let options = HybridOptions { apply_reranking: true, top_k: 0 };
    let results = repo.hybrid_search_with(&query("cats", 5, SearchStrategy::Hybrid), options).await.unwrap();
    assert_eq!(repo.gateway().requested_top_n.load(Ordering::SeqCst), 4);
    let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);

    let options = HybridOptions { apply_reranking: true, top_k: 2 };
    let results = repo.hybrid_search_with(&query("cats", 5, SearchStrategy::Hybrid), options).await.unwrap();
    assert_eq!(repo.gateway().requested_top_n.load(Ordering::SeqCst), 2);
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn sparse_query_without_known_terms_skips_index() {
    let gateway = ScriptedGateway { dense: vec![hit("a", "a", 0.5)], sparse: vec![hit("b", "b", 2.0)], ..Default::default() };
    let repo = repository(gateway, RepositoryConfig::default());

    // "reptiles" is out of vocabulary and encodes to no terms
    let results = repo.search(&query("reptiles", 5, SearchStrategy::Sparse)).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(repo.gateway().calls(), (0, 0, 0));

    let options = HybridOptions { apply_reranking: false, top_k: 5 };
    let results = repo.hybrid_search_with(&query("reptiles", 5, SearchStrategy::Hybrid), options).await.unwrap();
    assert_eq!(repo.gateway().calls(), (1, 0, 0));
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].score.sparse_score(), None);
}

#[tokio::test]
async fn empty_merge_skips_reranker() {
    let repo = repository(ScriptedGateway { rerank_scores: vec![0.9], ..Default::default() }, RepositoryConfig::default());
    let results = repo.search(&query("cats", 5, SearchStrategy::Hybrid)).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(repo.gateway().calls(), (1, 1, 0));
}

#[tokio::test]
async fn strategies_touch_only_their_index() {
    let gateway = ScriptedGateway { dense: vec![hit("a", "a", 0.5)], sparse: vec![hit("b", "b", 2.0)], ..Default::default() };
    let repo = repository(gateway, RepositoryConfig::default());

    let dense = repo.search(&query("cats", 5, SearchStrategy::Dense)).await.unwrap();
    assert_eq!(repo.gateway().calls(), (1, 0, 0));
    assert_eq!(dense[0].score, SearchScore::Dense { score: 0.5 });
    assert_eq!(dense[0].strategy_used, SearchStrategy::Dense);

    let sparse = repo.search(&query("cats", 5, SearchStrategy::Sparse)).await.unwrap();
    assert_eq!(repo.gateway().calls(), (1, 1, 0));
    assert_eq!(sparse[0].score.sparse_score(), Some(2.0));
    assert_eq!(sparse[0].score.dense_score(), None);
}

#[tokio::test]
async fn invalid_query_fails_before_any_call() {
    let repo = repository(ScriptedGateway::default(), RepositoryConfig::default());
    let bad = SearchQuery { text: "q".into(), max_results: 21, strategy: SearchStrategy::Hybrid, filters: None };
    let err = repo.search(&bad).await.unwrap_err();
    assert!(err.is_client_error());
    let empty = SearchQuery { text: String::new(), ..bad };
    assert!(repo.dense_search(&empty).await.is_err());
    assert_eq!(repo.gateway().calls(), (0, 0, 0));
}

#[tokio::test]
async fn store_batches_and_reports_batch_failure() {
    let config = RepositoryConfig { upsert_batch_size: 2, upsert_concurrency: 2, ..RepositoryConfig::default() };
    let repo = repository(ScriptedGateway { fail_sparse_upsert: true, ..Default::default() }, config);
    let chunks: Vec<DocumentChunk> = (0..5).map(|i| DocumentChunk::new(format!("c_{i}"), "cats are mammals")).collect();

    let err = repo.store(&chunks).await.unwrap_err();
    assert!(matches!(err, Error::Index(_)));
    let upserts = repo.gateway().upserts.lock().unwrap().clone();
    let dense_batches: Vec<usize> = upserts.iter().filter(|(k, _)| *k == IndexKind::Dense).map(|(_, n)| *n).collect();
    let sparse_batches = upserts.iter().filter(|(k, _)| *k == IndexKind::Sparse).count();
    assert_eq!(dense_batches.iter().sum::<usize>(), 5);
    assert_eq!(dense_batches.len(), 3);
    assert_eq!(sparse_batches, 3, "every sparse batch is attempted");
}

#[tokio::test]
async fn store_empty_is_noop() {
    let repo = repository(ScriptedGateway::default(), RepositoryConfig::default());
    assert_eq!(repo.store(&[]).await.unwrap(), 0);
    assert!(repo.gateway().upserts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn repeated_ingestion_converges() {
    let repo = repository(MemoryGateway::new(DIM), RepositoryConfig::default());
    let chunk = DocumentChunk::new("", "cats are mammals");
    repo.store(&[chunk.clone()]).await.unwrap();
    repo.store(&[chunk]).await.unwrap();
    assert_eq!(repo.gateway().len(IndexKind::Dense).await, 1);
    assert_eq!(repo.gateway().len(IndexKind::Sparse).await, 1);
}

async fn cats_and_dogs(fallback: RerankFallback) -> VectorStore<Arc<MemoryGateway>> {
    let mut config = RepositoryConfig::default();
    config.rerank.fallback = fallback;
    let store = VectorStore::new(repository(Arc::new(MemoryGateway::new(DIM)), config), SearchStrategy::Hybrid);
    let chunks = vec![
        RawChunk { content: "cats are mammals".into(), metadata: Metadata::new() },
        RawChunk { content: "dogs are mammals".into(), metadata: Metadata::new() },
    ];
    assert_eq!(store.store_documents(chunks, "pets.txt").await.unwrap(), 2);
    store
}

#[tokio::test]
async fn end_to_end_hybrid_with_relevant_matches() {
    let store = cats_and_dogs(RerankFallback::Empty).await;
    let results = store.search_similar("mammals", 2, None, None).await.unwrap();

    let mut ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["pets.txt_0", "pets.txt_1"]);
    assert!(results[0].relevance_score() >= results[1].relevance_score());
    for r in &results {
        assert!(r.relevance_score() > 0.7);
        assert_eq!(r.score.phase(), ScorePhase::Reranked);
        assert_eq!(r.document.file_name.as_deref(), Some("pets.txt"));
    }
    let dogs = results.iter().find(|r| r.document.id == "pets.txt_1").unwrap();
    assert_eq!(dogs.document.chunk_index, Some(1));
    assert_eq!(dogs.document.content, "dogs are mammals");
}

#[tokio::test]
async fn end_to_end_hybrid_below_threshold() {
    // half the query terms match each chunk: lexical relevance 0.5
    let strict = cats_and_dogs(RerankFallback::Empty).await;
    assert!(strict.search_similar("mammals reptiles", 2, None, None).await.unwrap().is_empty());

    let lenient = cats_and_dogs(RerankFallback::Merged).await;
    let results = lenient.search_similar("mammals reptiles", 2, None, None).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.score.is_hybrid()));
}

#[tokio::test]
async fn facade_strategy_handling() {
    let mut store = cats_and_dogs(RerankFallback::Empty).await;
    assert_eq!(store.available_strategies(), vec!["dense", "sparse", "hybrid"]);
    assert_eq!(store.current_strategy(), SearchStrategy::Hybrid);

    let err = store.search_similar("mammals", 2, Some("fuzzy"), None).await.unwrap_err();
    assert!(err.is_client_error());
    assert!(store.set_search_strategy("semantic").is_err());
    assert_eq!(store.current_strategy(), SearchStrategy::Hybrid);

    store.set_search_strategy("Sparse").unwrap();
    let results = store.search_similar("cats", 5, None, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.id, "pets.txt_0");
    assert_eq!(results[0].strategy_used, SearchStrategy::Sparse);

    let filters = json!({"chunk_index": 1}).as_object().cloned();
    let results = store.search_similar("mammals", 5, Some("dense"), filters).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.id, "pets.txt_1");

    let [dense, sparse] = store.index_stats().await.unwrap();
    assert_eq!((dense.record_count, sparse.record_count), (2, 2));
}

/// Gateway whose queries never complete in time.
struct SlowGateway;

#[async_trait]
impl IndexGateway for SlowGateway {
    async fn upsert(&self, _kind: IndexKind, records: Vec<IndexRecord>) -> Result<usize> { Ok(records.len()) }
    async fn query(&self, _kind: IndexKind, _vector: Vector, _top_k: usize, _filter: Option<&Metadata>) -> Result<Vec<IndexMatch>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Vec::new())
    }
    async fn rerank(&self, _query: &str, _candidates: &[RerankCandidate], _rank_field: &str, _top_n: usize) -> Result<Vec<RerankHit>> { Ok(Vec::new()) }
    async fn describe(&self, kind: IndexKind) -> Result<IndexStats> { Ok(IndexStats { name: kind.to_string(), ..IndexStats::default() }) }
}

#[tokio::test]
async fn search_timeout_is_reported() {
    let store = VectorStore::new(repository(SlowGateway, RepositoryConfig::default()), SearchStrategy::Dense).with_timeout(Some(Duration::from_millis(20)));
    let err = store.search_similar("cats", 1, None, None).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert!(err.is_transient());
}
