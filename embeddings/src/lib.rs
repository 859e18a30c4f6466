//! # Embeddings
//!
//! Embedding generation and vector similarity search for wiki retrieval.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors through any
//!   OpenAI-compatible embeddings endpoint
//! - **Caching**: Avoid re-embedding repeated queries
//! - **Corpus Indexes**: Store chunk vectors with metadata and answer top-k
//!   similarity queries, either in memory or through Pinecone
//! - **Index Setup**: Create the Pinecone serverless index on first use
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► CorpusIndex                │
//! │       │                                   │                     │
//! │       ▼                                   ▼                     │
//! │  CachedProvider                 MemoryIndex / PineconeIndex     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod index;
pub mod pinecone;
pub mod provider;
pub mod similarity;

pub use cache::{CachedProvider, EmbeddingCache};
pub use error::{EmbeddingError, Result};
pub use index::{CorpusIndex, IndexMatch, IndexRecord, IndexStats, MemoryIndex};
pub use pinecone::{
    IndexDescription, IndexStatus, PineconeAdmin, PineconeIndex, ServerlessIndexSpec,
};
pub use provider::{EmbeddingProvider, OpenAIProvider};
pub use similarity::{SimilarityResult, cosine_similarity};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension of `all-MiniLM-L6-v2` style sentence embeddings.
pub const DEFAULT_DIMENSION: usize = 384;
