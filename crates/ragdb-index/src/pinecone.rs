//! HTTP gateway to a Pinecone-compatible vector and rerank service.
//!
//! The control plane (index management, inference) lives at `control_url`;
//! each index is served from its own data-plane host, resolved on connect.

use std::time::Duration;

use async_trait::async_trait;
use ragdb_core::config::{IndexSettings, RerankSettings};
use ragdb_core::traits::{IndexGateway, IndexMatch, IndexRecord, IndexStats, RerankCandidate, RerankHit};
use ragdb_core::types::{IndexKind, Metadata, SparseVector, Vector};
use ragdb_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct IndexHandle {
    name: String,
    host: String,
}

pub struct PineconeGateway {
    client: reqwest::Client,
    control_url: String,
    api_key: String,
    api_version: String,
    dense: IndexHandle,
    sparse: IndexHandle,
    rerank_model: String,
    batch_size: usize,
}

#[derive(Deserialize)]
struct IndexDescription {
    host: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireVector<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<&'a [f32]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sparse_values: Option<&'a SparseVector>,
    metadata: &'a Metadata,
}

impl<'a> From<&'a IndexRecord> for WireVector<'a> {
    fn from(r: &'a IndexRecord) -> Self {
        let (values, sparse_values) = match &r.vector {
            Vector::Dense(v) => (Some(v.as_slice()), None),
            Vector::Sparse(s) => (None, Some(s)),
        };
        Self { id: &r.id, values, sparse_values, metadata: &r.metadata }
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<WireVector<'a>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    vector: Option<&'a [f32]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sparse_vector: Option<&'a SparseVector>,
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Metadata>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<Metadata>,
    rank_fields: [&'a str; 1],
    top_n: usize,
    return_documents: bool,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    data: Vec<RerankRow>,
}

#[derive(Debug, Deserialize)]
struct RerankRow {
    index: usize,
    score: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    total_vector_count: u64,
}

impl PineconeGateway {
    /// Connect and make sure both indexes exist: dense with cosine similarity
    /// at `dense_dimension`, sparse with dot-product.
    pub async fn connect(settings: &IndexSettings, rerank: &RerankSettings, dense_dimension: usize) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or_else(|| Error::InvalidConfig("index.api_key is required for the pinecone backend".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;
        let mut gateway = Self {
            client,
            control_url: settings.control_url.trim_end_matches('/').to_string(),
            api_key,
            api_version: settings.api_version.clone(),
            dense: IndexHandle { name: settings.dense_name.clone(), host: String::new() },
            sparse: IndexHandle { name: settings.sparse_name.clone(), host: String::new() },
            rerank_model: rerank.model.clone(),
            batch_size: settings.upsert_batch_size.max(1),
        };
        let spec = json!({"serverless": {"cloud": settings.cloud, "region": settings.region}});
        gateway.dense.host = gateway
            .ensure_index(&settings.dense_name, json!({"name": settings.dense_name, "dimension": dense_dimension, "metric": "cosine", "spec": spec}))
            .await?;
        gateway.sparse.host = gateway
            .ensure_index(&settings.sparse_name, json!({"name": settings.sparse_name, "metric": "dotproduct", "vector_type": "sparse", "spec": spec}))
            .await?;
        Ok(gateway)
    }

    async fn ensure_index(&self, name: &str, create_body: Value) -> Result<String> {
        let url = format!("{}/indexes/{}", self.control_url, name);
        let resp = self.request(self.client.get(&url)).send().await.map_err(|e| Error::Index(format!("Failed to describe index '{}': {}", name, e)))?;
        if resp.status().is_success() {
            let desc: IndexDescription = resp.json().await.map_err(|e| Error::Index(format!("Failed to parse index description: {}", e)))?;
            return Ok(data_plane_url(&desc.host));
        }
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Index(format!("Describe index '{}' returned {}: {}", name, status, body)));
        }
        info!(index = name, "creating missing index");
        let desc: IndexDescription = self.post_json(&format!("{}/indexes", self.control_url), &create_body, Error::Index).await?;
        Ok(data_plane_url(&desc.host))
    }

    fn handle(&self, kind: IndexKind) -> &IndexHandle {
        match kind { IndexKind::Dense => &self.dense, IndexKind::Sparse => &self.sparse }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Api-Key", &self.api_key).header("X-Pinecone-API-Version", &self.api_version)
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(&self, url: &str, body: &B, err: fn(String) -> Error) -> Result<R> {
        let resp = self.request(self.client.post(url)).json(body).send().await.map_err(|e| err(format!("Failed to call {}: {}", url, e)))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| err(format!("Failed to read response from {}: {}", url, e)))?;
        parse_response(url, status, &text, err)
    }
}

/// Non-2xx statuses and undecodable bodies both become `err`, so callers
/// pick `Error::Index` or `Error::Rerank` once.
fn parse_response<R: DeserializeOwned>(url: &str, status: reqwest::StatusCode, body: &str, err: fn(String) -> Error) -> Result<R> {
    if !status.is_success() {
        return Err(err(format!("{} returned {}: {}", url, status, body)));
    }
    serde_json::from_str(body).map_err(|e| err(format!("Failed to parse response from {}: {}", url, e)))
}

fn upsert_batches(records: &[IndexRecord], batch_size: usize) -> Vec<UpsertRequest<'_>> {
    records.chunks(batch_size.max(1)).map(|batch| UpsertRequest { vectors: batch.iter().map(WireVector::from).collect() }).collect()
}

fn rerank_hits(resp: RerankResponse) -> Vec<RerankHit> {
    resp.data.into_iter().map(|r| RerankHit { index: r.index, score: r.score }).collect()
}

fn data_plane_url(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") { host.trim_end_matches('/').to_string() } else { format!("https://{}", host) }
}

fn query_request(vector: &Vector, top_k: usize, filter: Option<&Metadata>) -> Value {
    let (dense, sparse) = match vector {
        Vector::Dense(v) => (Some(v.as_slice()), None),
        Vector::Sparse(s) => (None, Some(s)),
    };
    let req = QueryRequest { vector: dense, sparse_vector: sparse, top_k, include_metadata: true, filter };
    serde_json::to_value(req).unwrap_or(Value::Null)
}

fn rerank_documents(candidates: &[RerankCandidate]) -> Vec<Metadata> {
    candidates
        .iter()
        .map(|c| {
            let mut doc = c.fields.clone();
            doc.insert("id".to_string(), Value::String(c.id.clone()));
            doc
        })
        .collect()
}

#[async_trait]
impl IndexGateway for PineconeGateway {
    async fn upsert(&self, kind: IndexKind, records: Vec<IndexRecord>) -> Result<usize> {
        let handle = self.handle(kind);
        let url = format!("{}/vectors/upsert", handle.host);
        let mut total = 0usize;
        for body in upsert_batches(&records, self.batch_size) {
            let resp: UpsertResponse = self.post_json(&url, &body, Error::Index).await?;
            total += resp.upserted_count;
            debug!(index = %handle.name, batch = body.vectors.len(), "upserted batch");
        }
        Ok(total)
    }

    async fn query(&self, kind: IndexKind, vector: Vector, top_k: usize, filter: Option<&Metadata>) -> Result<Vec<IndexMatch>> {
        let handle = self.handle(kind);
        let body = query_request(&vector, top_k, filter);
        let resp: QueryResponse = self.post_json(&format!("{}/query", handle.host), &body, Error::Index).await?;
        debug!(index = %handle.name, matches = resp.matches.len(), "query");
        Ok(resp.matches.into_iter().map(|m| IndexMatch { id: m.id, score: m.score, metadata: m.metadata.unwrap_or_default() }).collect())
    }

    async fn rerank(&self, query: &str, candidates: &[RerankCandidate], rank_field: &str, top_n: usize) -> Result<Vec<RerankHit>> {
        let body = RerankRequest {
            model: &self.rerank_model,
            query,
            documents: rerank_documents(candidates),
            rank_fields: [rank_field],
            top_n,
            return_documents: true,
            parameters: json!({"truncate": "END"}),
        };
        let resp: RerankResponse = self.post_json(&format!("{}/rerank", self.control_url), &body, Error::Rerank).await?;
        Ok(rerank_hits(resp))
    }

    async fn describe(&self, kind: IndexKind) -> Result<IndexStats> {
        let handle = self.handle(kind);
        let resp: StatsResponse = self.post_json(&format!("{}/describe_index_stats", handle.host), &json!({}), Error::Index).await?;
        Ok(IndexStats { name: handle.name.clone(), dimension: resp.dimension, record_count: resp.total_vector_count })
    }
}
