use std::time::Duration;

use async_trait::async_trait;
use ragdb_core::config::EmbeddingSettings;
use ragdb_core::traits::{Encoded, TextEncoder};
use ragdb_core::types::{DenseVector, IndexKind};
use ragdb_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Dense encoder backed by an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct OpenAiEncoder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEncoder {
    pub fn new(settings: &EmbeddingSettings, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: format!("{}/v1/embeddings", settings.api_base.trim_end_matches('/')),
            api_key,
            model: settings.model.clone(),
            dimension: settings.dimension,
            batch_size: settings.batch_size.max(1),
        })
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<DenseVector>> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest { model: &self.model, input: texts })
            .send()
            .await
            .map_err(|e| Error::Encoder(format!("Failed to call embedding API: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Encoder(format!("Embedding API returned {}: {}", status, body)));
        }

        let body: EmbedResponse = resp.json().await.map_err(|e| Error::Encoder(format!("Failed to parse embedding response: {}", e)))?;
        into_vectors(body, texts.len(), self.dimension)
    }
}

/// Restore input order from the response `index` field and check shape.
fn into_vectors(body: EmbedResponse, expected: usize, dimension: usize) -> Result<Vec<DenseVector>> {
    let mut data = body.data;
    if data.len() != expected {
        return Err(Error::Encoder(format!("embedding API returned {} vectors for {} texts", data.len(), expected)));
    }
    data.sort_by_key(|d| d.index);
    data.into_iter()
        .map(|d| {
            if d.embedding.len() != dimension {
                return Err(Error::Encoder(format!("expected {}-dim embedding, got {}", dimension, d.embedding.len())));
            }
            Ok(d.embedding)
        })
        .collect()
}

#[async_trait]
impl TextEncoder for OpenAiEncoder {
    type Vector = DenseVector;

    fn kind(&self) -> IndexKind { IndexKind::Dense }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Encoded<DenseVector>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let vectors = self.embed_chunk(chunk).await?;
            debug!(model = %self.model, batch = chunk.len(), "embedded batch");
            out.extend(chunk.iter().zip(vectors).map(|(text, vector)| Encoded { text: text.clone(), dimension: vector.len(), vector }));
        }
        Ok(out)
    }
}
