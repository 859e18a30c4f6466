//! Error types for the answering engine.

use std::time::Duration;

use thiserror::Error;

use lore_embeddings::EmbeddingError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur while answering questions or indexing the corpus.
///
/// An empty retrieval result is not an error; it produces the fallback
/// answer instead.
#[derive(Error, Debug)]
pub enum RagError {
    /// Missing credentials, collaborators or invalid settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedder or the corpus index failed while answering a question.
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] EmbeddingError),

    /// Retrieval did not finish in time.
    #[error("retrieval timed out after {0:?}")]
    RetrievalTimeout(Duration),

    /// The language model call failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The language model did not answer in time.
    #[error("generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    /// Embedding chunks for the index, or provisioning the index, failed.
    #[error("indexing failed: {0}")]
    Indexing(#[source] EmbeddingError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether this error came from the retrieval stage of `ask`.
    pub fn is_retrieval(&self) -> bool {
        matches!(self, Self::Retrieval(_) | Self::RetrievalTimeout(_))
    }

    /// Whether this error came from the generation stage of `ask`.
    pub fn is_generation(&self) -> bool {
        matches!(self, Self::Generation(_) | Self::GenerationTimeout(_))
    }
}
