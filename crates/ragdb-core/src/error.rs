use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before any collaborator is called.
    #[error("Invalid query: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoder failed: {0}")]
    Encoder(String),

    #[error("Index service error: {0}")]
    Index(String),

    #[error("Rerank service error: {0}")]
    Rerank(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl Error {
    /// Collaborator failures a caller may retry. Ingestion ids are stable, so
    /// re-running a failed `store` converges instead of duplicating records.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Encoder(_) | Error::Index(_) | Error::Rerank(_) | Error::Timeout(_))
    }

    pub fn is_client_error(&self) -> bool { matches!(self, Error::Validation(_)) }
}

pub type Result<T> = std::result::Result<T, Error>;
