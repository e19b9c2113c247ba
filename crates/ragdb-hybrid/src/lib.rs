//! Hybrid retrieval: store chunks into a dense and a sparse index, search
//! either one, or merge both and refine the merged set with a reranker.

pub mod merge;
pub mod repository;
pub mod store;

pub use merge::{apply_rerank, merge_results, rank_merged, rerank_candidates};
pub use repository::{HybridOptions, HybridSearchRepository, RepositoryConfig};
pub use store::VectorStore;
