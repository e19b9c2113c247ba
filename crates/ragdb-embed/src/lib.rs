//! Text encoders: a dense embedding-API encoder, a deterministic hashing
//! encoder for offline use, and the term-frequency sparse encoder.

use std::path::Path;

use ragdb_core::config::{EmbeddingSettings, SparseSettings};
use ragdb_core::traits::DenseEncoder;
use ragdb_core::{Error, Result};
use tracing::info;

pub mod dense;
pub mod hashing;
pub mod sparse;
pub mod tokenize;

pub use dense::OpenAiEncoder;
pub use hashing::HashingEncoder;
pub use sparse::BertSparseEncoder;

/// Dense encoder selected by configuration. `APP_USE_FAKE_EMBEDDINGS=1` or
/// `embedding.use_fake` switches to [`HashingEncoder`].
pub fn get_default_dense_encoder(settings: &EmbeddingSettings) -> Result<Box<DenseEncoder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake || settings.use_fake {
        info!(dim = settings.dimension, "using hashing encoder");
        return Ok(Box::new(HashingEncoder::new(settings.dimension)));
    }
    let api_key = settings
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .ok_or_else(|| Error::InvalidConfig("embedding.api_key (or OPENAI_API_KEY) is required".into()))?;
    info!(model = %settings.model, dim = settings.dimension, "using embedding API");
    Ok(Box::new(OpenAiEncoder::new(settings, api_key)?))
}

/// Sparse encoder from the configured `tokenizer.json`; `tokenizer_path`
/// must already be resolved.
pub fn load_sparse_encoder(settings: &SparseSettings, tokenizer_path: &Path) -> Result<BertSparseEncoder> {
    info!(tokenizer = %settings.tokenizer, path = %tokenizer_path.display(), "loading sparse tokenizer");
    BertSparseEncoder::from_file(tokenizer_path, settings.max_tokens)
}
