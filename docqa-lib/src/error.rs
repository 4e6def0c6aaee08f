//! Error types for docqa

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for docqa operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in docqa operations
#[derive(Error, Debug)]
pub enum Error {
    /// A source file could not be read as UTF-8 text
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A text unit with this identifier is already in the store
    #[error("already indexed: {0}")]
    AlreadyIndexed(String),

    /// Dense retrieval was requested before embeddings were computed
    #[error("embeddings not built: {missing} text unit(s) have no embedding, run update_embeddings first")]
    EmbeddingsNotBuilt { missing: usize },

    /// Failed to load or run the embedding model
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Failed to load or run the extractive reading model
    #[error("reader error: {0}")]
    Reader(String),

    /// The generation request did not finish in time
    #[error("generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    /// The generation capability failed or is unreachable
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// The document store could not be accessed
    #[error("store error: {0}")]
    Store(String),

    /// Text unit not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input provided
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Returns `true` for errors that degrade a result instead of aborting it.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyIndexed(_) | Self::GenerationTimeout(_) | Self::GenerationUnavailable(_)
        )
    }
}
