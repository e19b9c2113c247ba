//! Wiring shared by the `ragdb` binary: chunk-file loading and building a
//! [`VectorStore`] from settings.

pub mod backend;
pub mod corpus;

pub use backend::{build_store, Gateway};
pub use corpus::{load_chunk_file, list_chunk_files};
