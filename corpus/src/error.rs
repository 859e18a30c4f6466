//! Error types for corpus preparation.

use thiserror::Error;

/// Result type alias for corpus operations.
pub type Result<T> = std::result::Result<T, CorpusError>;

/// Errors that can occur while loading, chunking or persisting the corpus.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// Chunking parameters are unusable.
    #[error("invalid chunker configuration: {0}")]
    InvalidConfig(String),

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create storage directory.
    #[error("failed to create directory: {0}")]
    CreateDirectory(String),

    /// Failed to read a file.
    #[error("failed to read file: {0}")]
    ReadFile(String),

    /// Failed to write a file.
    #[error("failed to write file: {0}")]
    WriteFile(String),
}
