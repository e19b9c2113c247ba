//! Domain types shared by the encoders, the index gateways and the hybrid
//! repository.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub type ChunkId = String;
/// Open key/value metadata, kept in the index service's JSON shape.
pub type Metadata = serde_json::Map<String, Value>;
pub type DenseVector = Vec<f32>;

/// Stored-metadata key carrying the chunk text. Also the default rerank field.
pub const CONTENT_KEY: &str = "chunk_text";
pub const FILE_NAME_KEY: &str = "file_name";
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

pub const MAX_QUERY_CHARS: usize = 1000;
pub const MAX_RESULTS_LIMIT: usize = 20;

/// A chunk of a source document, the atomic retrievable unit.
///
/// - `id`: stable identity within the corpus; empty means "derive from content"
/// - `content`: the text payload
/// - `metadata`: caller metadata, stored alongside the vectors
/// - `file_name`/`chunk_index`: origin document and position within it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub chunk_index: Option<usize>,
}

impl DocumentChunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), metadata: Metadata::new(), file_name: None, chunk_index: None }
    }

    /// The id the chunk is stored under: its own id when set, otherwise a
    /// content hash so identical text converges to one record.
    pub fn identity(&self) -> ChunkId {
        if !self.id.is_empty() { return self.id.clone(); }
        content_id(&self.content)
    }

    /// `{chunk_text, file_name, chunk_index, ...metadata}`; caller keys win.
    pub fn stored_metadata(&self) -> Metadata {
        let mut out = Metadata::new();
        out.insert(CONTENT_KEY.to_string(), Value::String(self.content.clone()));
        out.insert(FILE_NAME_KEY.to_string(), Value::String(self.file_name.clone().unwrap_or_default()));
        if let Some(i) = self.chunk_index { out.insert(CHUNK_INDEX_KEY.to_string(), Value::from(i)); }
        for (k, v) in &self.metadata { out.insert(k.clone(), v.clone()); }
        out
    }

    /// Rebuild a chunk from an index match. Reserved keys are lifted back into
    /// fields; whatever remains is the caller metadata.
    pub fn from_stored(id: impl Into<String>, mut metadata: Metadata) -> Self {
        let content = match metadata.remove(CONTENT_KEY) { Some(Value::String(s)) => s, _ => String::new() };
        let file_name = match metadata.remove(FILE_NAME_KEY) { Some(Value::String(s)) if !s.is_empty() => Some(s), _ => None };
        // the service may hand integers back as floats
        let chunk_index = metadata.remove(CHUNK_INDEX_KEY).and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64))).map(|i| i as usize);
        Self { id: id.into(), content, metadata, file_name, chunk_index }
    }
}

impl fmt::Display for DocumentChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentChunk(id={}, content_length={})", self.id, self.content.len())
    }
}

/// Deterministic content-derived id (blake3 hex digest).
pub fn content_id(content: &str) -> ChunkId { blake3::hash(content.as_bytes()).to_hex().to_string() }

/// A chunk as handed over by the chunking collaborator, before it is placed
/// within its file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawChunk {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Dense,
    Sparse,
    Hybrid,
}

impl SearchStrategy {
    pub const ALL: [SearchStrategy; 3] = [SearchStrategy::Dense, SearchStrategy::Sparse, SearchStrategy::Hybrid];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Dense => "dense",
            SearchStrategy::Sparse => "sparse",
            SearchStrategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for SearchStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" => Ok(SearchStrategy::Dense),
            "sparse" => Ok(SearchStrategy::Sparse),
            "hybrid" => Ok(SearchStrategy::Hybrid),
            other => Err(Error::Validation(format!(
                "unsupported search strategy '{}', expected one of: dense, sparse, hybrid",
                other
            ))),
        }
    }
}

fn default_max_results() -> usize { 5 }
fn default_strategy() -> SearchStrategy { SearchStrategy::Hybrid }

/// A per-request query. Construct with [`SearchQuery::new`]; repositories
/// re-check [`SearchQuery::validate`] before touching any collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_strategy")]
    pub strategy: SearchStrategy,
    #[serde(default)]
    pub filters: Option<Metadata>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, max_results: usize, strategy: SearchStrategy) -> Result<Self> {
        let query = Self { text: text.into(), max_results, strategy, filters: None };
        query.validate()?;
        Ok(query)
    }

    pub fn with_filters(mut self, filters: Option<Metadata>) -> Self {
        self.filters = filters;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let chars = self.text.chars().count();
        if chars == 0 || chars > MAX_QUERY_CHARS {
            return Err(Error::Validation(format!("query text must be 1-{} characters, got {}", MAX_QUERY_CHARS, chars)));
        }
        if self.max_results == 0 || self.max_results > MAX_RESULTS_LIMIT {
            return Err(Error::Validation(format!("max_results must be 1-{}, got {}", MAX_RESULTS_LIMIT, self.max_results)));
        }
        Ok(())
    }
}

/// Which stage of the pipeline produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorePhase {
    Raw,
    Merged,
    Reranked,
}

/// Relevance score, tagged by pipeline phase.
///
/// Raw scores are each index's native similarity. A merged score keeps the
/// raw components it saw plus the winning one as `combined`. A reranked score
/// replaces all of that: reranker scores live on their own scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SearchScore {
    Dense { score: f32 },
    Sparse { score: f32 },
    Merged { dense: Option<f32>, sparse: Option<f32>, combined: f32 },
    Reranked { score: f32 },
}

impl SearchScore {
    pub fn phase(&self) -> ScorePhase {
        match self {
            SearchScore::Dense { .. } | SearchScore::Sparse { .. } => ScorePhase::Raw,
            SearchScore::Merged { .. } => ScorePhase::Merged,
            SearchScore::Reranked { .. } => ScorePhase::Reranked,
        }
    }

    pub fn dense_score(&self) -> Option<f32> {
        match *self {
            SearchScore::Dense { score } => Some(score),
            SearchScore::Merged { dense, .. } => dense,
            _ => None,
        }
    }

    pub fn sparse_score(&self) -> Option<f32> {
        match *self {
            SearchScore::Sparse { score } => Some(score),
            SearchScore::Merged { sparse, .. } => sparse,
            _ => None,
        }
    }

    pub fn combined_score(&self) -> Option<f32> {
        match *self { SearchScore::Merged { combined, .. } => Some(combined), _ => None }
    }

    pub fn rerank_score(&self) -> Option<f32> {
        match *self { SearchScore::Reranked { score } => Some(score), _ => None }
    }

    /// The single-strategy score: dense when present, otherwise sparse.
    pub fn original_score(&self) -> Option<f32> { self.dense_score().or(self.sparse_score()) }

    pub fn is_hybrid(&self) -> bool { self.dense_score().is_some() && self.sparse_score().is_some() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: DocumentChunk,
    pub score: SearchScore,
    /// Label of the last pipeline stage applied to this result.
    pub strategy_used: SearchStrategy,
}

impl SearchResult {
    /// The score used for ranking at the result's current phase.
    pub fn relevance_score(&self) -> f32 {
        match self.score {
            SearchScore::Dense { score } | SearchScore::Sparse { score } | SearchScore::Reranked { score } => score,
            SearchScore::Merged { combined, .. } => combined,
        }
    }
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SearchResult(doc={}, score={:.3}, strategy={})", self.document.id, self.relevance_score(), self.strategy_used)
    }
}

/// The two physically separate indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Dense,
    Sparse,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self { IndexKind::Dense => "dense", IndexKind::Sparse => "sparse" }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Parallel index/value arrays over a fixed vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn len(&self) -> usize { self.indices.len() }
    pub fn is_empty(&self) -> bool { self.indices.is_empty() }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let mut sum = 0.0;
        for (i, v) in self.indices.iter().zip(&self.values) {
            if let Some(pos) = other.indices.iter().position(|j| j == i) { sum += v * other.values[pos]; }
        }
        sum
    }
}

/// Vector payload for one index.
#[derive(Debug, Clone, PartialEq)]
pub enum Vector {
    Dense(DenseVector),
    Sparse(SparseVector),
}

impl Vector {
    pub fn kind(&self) -> IndexKind {
        match self { Vector::Dense(_) => IndexKind::Dense, Vector::Sparse(_) => IndexKind::Sparse }
    }
}
