//! ragdb-core
//!
//! Domain types, error taxonomy, configuration and the collaborator traits
//! (text encoders, index gateway) shared by the hybrid retrieval crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
