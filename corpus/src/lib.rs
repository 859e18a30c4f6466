//! # Corpus
//!
//! Offline preparation of the wiki corpus for retrieval:
//!
//! - **Pages**: cleaned `{url, title, content}` records
//! - **Chunking**: deterministic recursive splitting into overlapping windows
//! - **Storage**: chunk records and a run summary persisted as JSON
//!
//! ```text
//! cleaned_data.json ──► WikiPage ──► CorpusChunker ──► Chunk ──► ChunkStore
//!                                         │
//!                                         ▼
//!                                  RecursiveChunker
//! ```

pub mod chunker;
pub mod document;
pub mod error;
pub mod storage;

pub use chunker::{
    Chunk, ChunkMetadata, ChunkerConfig, CorpusChunker, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP,
    DEFAULT_SEPARATORS, DEFAULT_SOURCE, RecursiveChunker, split_text,
};
pub use document::{WikiPage, load_pages};
pub use error::{CorpusError, Result, StorageError};
pub use storage::{ChunkStore, ChunkSummary, load_chunks};
