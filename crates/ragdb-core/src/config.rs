//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_INDEX__API_KEY`). Provides helpers to
//! expand `~` and `${VAR}` and to resolve relative paths against the directory
//! the configuration was loaded from.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{SearchStrategy, CONTENT_KEY, MAX_RESULTS_LIMIT};

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> { Self::load_from(Path::new(".")) }

    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, base_dir: dir.to_path_buf() };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view over every section; missing keys take their defaults.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn resolve_path<S: AsRef<str>>(&self, p: S) -> PathBuf { resolve_with_base(&self.base_dir, p) }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        if matches!(env, "prod" | "production") {
            let backend: Option<String> = self.figment.extract_inner("index.backend").ok();
            let key: Option<String> = self.figment.extract_inner("index.api_key").ok();
            if backend.as_deref() != Some("memory") && key.is_none() {
                anyhow::bail!("index.api_key is required in production (set APP_INDEX__API_KEY)");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub embedding: EmbeddingSettings,
    pub sparse: SparseSettings,
    pub index: IndexSettings,
    pub rerank: RerankSettings,
    pub search: SearchSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 { return Err(Error::InvalidConfig("embedding.dimension must be > 0".into())); }
        if self.embedding.batch_size == 0 { return Err(Error::InvalidConfig("embedding.batch_size must be > 0".into())); }
        if self.index.upsert_batch_size == 0 || self.index.upsert_concurrency == 0 {
            return Err(Error::InvalidConfig("index.upsert_batch_size and index.upsert_concurrency must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.rerank.threshold) {
            return Err(Error::InvalidConfig(format!("rerank.threshold must be within [0, 1], got {}", self.rerank.threshold)));
        }
        if self.rerank.top_k == 0 { return Err(Error::InvalidConfig("rerank.top_k must be > 0".into())); }
        if self.search.default_max_results == 0 || self.search.default_max_results > MAX_RESULTS_LIMIT {
            return Err(Error::InvalidConfig(format!("search.default_max_results must be 1-{}", MAX_RESULTS_LIMIT)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
    pub dimension: usize,
    pub api_base: String,
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub request_timeout_secs: u64,
    /// Swap the remote model for the deterministic hashing encoder.
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            api_base: "https://api.openai.com".to_string(),
            api_key: None,
            batch_size: 64,
            request_timeout_secs: 30,
            use_fake: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseSettings {
    pub tokenizer: String,
    pub tokenizer_path: String,
    pub max_tokens: usize,
}

impl Default for SparseSettings {
    fn default() -> Self {
        Self {
            tokenizer: "bert-base-multilingual-uncased".to_string(),
            tokenizer_path: "models/bert-base-multilingual-uncased/tokenizer.json".to_string(),
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Pinecone,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    pub api_key: Option<String>,
    pub control_url: String,
    pub api_version: String,
    pub dense_name: String,
    pub sparse_name: String,
    pub cloud: String,
    pub region: String,
    pub upsert_batch_size: usize,
    pub upsert_concurrency: usize,
    pub request_timeout_secs: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Pinecone,
            api_key: None,
            control_url: "https://api.pinecone.io".to_string(),
            api_version: "2025-01".to_string(),
            dense_name: "dense-chat-with-pdf".to_string(),
            sparse_name: "sparse-chat-with-pdf".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            upsert_batch_size: 100,
            upsert_concurrency: 4,
            request_timeout_secs: 30,
        }
    }
}

/// What hybrid search returns when no reranked candidate clears the threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankFallback {
    /// Strict precision: nothing.
    #[default]
    Empty,
    /// The pre-rerank merged ranking.
    Merged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub enabled: bool,
    pub model: String,
    pub threshold: f32,
    pub top_k: usize,
    pub rank_field: String,
    pub fallback: RerankFallback,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "bge-reranker-v2-m3".to_string(),
            threshold: 0.7,
            top_k: 5,
            rank_field: CONTENT_KEY.to_string(),
            fallback: RerankFallback::Empty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_strategy: SearchStrategy,
    pub default_max_results: usize,
    pub timeout_secs: Option<u64>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { default_strategy: SearchStrategy::Hybrid, default_max_results: 5, timeout_secs: None }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
