use std::fs;
use tempfile::TempDir;

use ragdb_core::config::{Config, IndexBackend, RerankFallback};
use ragdb_core::types::{SearchQuery, SearchStrategy};
use ragdb_core::Error;

#[test]
fn max_results_bounds() {
    for k in [1, 20] {
        assert!(SearchQuery::new("mammals", k, SearchStrategy::Hybrid).is_ok(), "max_results={k} accepted");
    }
    for k in [0, 21] {
        let err = SearchQuery::new("mammals", k, SearchStrategy::Hybrid).unwrap_err();
        assert!(err.is_client_error(), "max_results={k} rejected as validation error");
    }
}

#[test]
fn query_text_length_bounds() {
    assert!(SearchQuery::new("", 5, SearchStrategy::Dense).is_err());
    assert!(SearchQuery::new("a".repeat(1000), 5, SearchStrategy::Dense).is_ok());
    assert!(SearchQuery::new("a".repeat(1001), 5, SearchStrategy::Dense).is_err());
    // bounds count characters, not bytes
    assert!(SearchQuery::new("é".repeat(1000), 5, SearchStrategy::Dense).is_ok());
}

#[test]
fn strategy_parsing() {
    assert_eq!("dense".parse::<SearchStrategy>().unwrap(), SearchStrategy::Dense);
    assert_eq!(" Hybrid ".parse::<SearchStrategy>().unwrap(), SearchStrategy::Hybrid);
    assert!(matches!("semantic".parse::<SearchStrategy>(), Err(Error::Validation(_))));
}

#[test]
fn query_deserializes_with_defaults() {
    let q: SearchQuery = serde_json::from_str(r#"{"text": "cats"}"#).unwrap();
    assert_eq!(q.max_results, 5);
    assert_eq!(q.strategy, SearchStrategy::Hybrid);
    assert!(q.filters.is_none());
    let bad = serde_json::from_str::<SearchQuery>(r#"{"text": "cats", "strategy": "fuzzy"}"#);
    assert!(bad.is_err(), "unknown strategy never falls back silently");
}

#[test]
fn settings_from_config_file() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        r#"
[index]
backend = "memory"
dense_name = "dense-test"

[rerank]
threshold = 0.5
fallback = "merged"
"#,
    )
    .unwrap();

    let config = Config::load_from(tmp.path()).expect("load");
    let settings = config.settings().expect("settings");
    assert_eq!(settings.index.backend, IndexBackend::Memory);
    assert_eq!(settings.index.dense_name, "dense-test");
    assert_eq!(settings.index.sparse_name, "sparse-chat-with-pdf", "unset keys keep defaults");
    assert_eq!(settings.rerank.fallback, RerankFallback::Merged);
    assert!((settings.rerank.threshold - 0.5).abs() < 1e-6);
    assert_eq!(settings.embedding.dimension, 1536);

    let name: String = config.get("index.dense_name").unwrap();
    assert_eq!(name, "dense-test");
    assert_eq!(config.resolve_path("tok.json"), tmp.path().join("tok.json"));
}

#[test]
fn out_of_range_threshold_is_config_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("config.toml"), "[rerank]\nthreshold = 1.5\n").unwrap();
    let config = Config::load_from(tmp.path()).expect("load");
    assert!(matches!(config.settings(), Err(Error::InvalidConfig(_))));
}
