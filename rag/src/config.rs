//! Configuration for the answering engine and the indexing pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use lore_corpus::{ChunkerConfig, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, DEFAULT_SOURCE};
use lore_embeddings::DEFAULT_DIMENSION;

use crate::error::{RagError, Result};

/// Environment variable holding the embeddings API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the Pinecone API key.
pub const PINECONE_API_KEY_ENV: &str = "PINECONE_API_KEY";

/// Environment variable holding the Gemini API key.
pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Top-level configuration.
///
/// Every section has defaults, so a TOML file only needs the keys it changes.
/// Credentials are never read from the file; they come from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Corpus index configuration.
    pub index: IndexConfig,

    /// Language model configuration.
    pub generation: GenerationConfig,

    /// Question answering configuration.
    pub query: QueryConfig,

    /// Chunking configuration.
    pub chunking: ChunkingConfig,

    /// Indexing pipeline configuration.
    pub indexing: IndexingConfig,
}

impl RagConfig {
    /// Load a configuration file and validate it.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            RagError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;

        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RagError::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that would otherwise fail later.
    pub fn validate(&self) -> Result<()> {
        if self.query.top_k == 0 {
            return Err(RagError::Configuration("query.top_k must be at least 1".into()));
        }
        if self.query.timeout_secs == 0 {
            return Err(RagError::Configuration(
                "query.timeout_secs must be at least 1".into(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Configuration(
                "embedding.dimension must be at least 1".into(),
            ));
        }
        if self.indexing.embed_batch_size == 0
            || self.indexing.upsert_batch_size == 0
            || self.indexing.concurrency == 0
        {
            return Err(RagError::Configuration(
                "indexing batch sizes and concurrency must be at least 1".into(),
            ));
        }
        if self.index.provider == IndexProviderType::Pinecone && self.index.host.is_none() {
            return Err(RagError::Configuration(
                "index.host is required for the pinecone index".into(),
            ));
        }
        self.chunking
            .chunker_config()
            .validate()
            .map_err(|e| RagError::Configuration(e.to_string()))
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Override the provider's API base URL.
    pub base_url: Option<String>,

    /// Model to use for embeddings.
    pub model: Option<String>,

    /// Vector dimension shared by the embedder and the index.
    pub dimension: usize,

    /// Whether to cache embeddings.
    pub cache_enabled: bool,

    /// Maximum cache size.
    pub cache_max_entries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::OpenAI,
            base_url: None,
            model: None,
            dimension: DEFAULT_DIMENSION,
            cache_enabled: true,
            cache_max_entries: 10000,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// OpenAI embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
    /// A local server speaking the same protocol, without authentication.
    Local,
}

/// Configuration for the corpus index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Which index backend to use.
    pub provider: IndexProviderType,

    /// Pinecone index host.
    pub host: Option<String>,

    /// Pinecone namespace.
    pub namespace: Option<String>,

    /// Pinecone index name used by `lore setup`.
    pub name: String,

    /// Cloud hosting a newly created Pinecone index.
    pub cloud: String,

    /// Region hosting a newly created Pinecone index.
    pub region: String,

    /// File backing the in-memory index.
    pub memory_path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: IndexProviderType::Memory,
            host: None,
            namespace: None,
            name: "wiki-rag".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            memory_path: dirs::data_dir()
                .unwrap_or_default()
                .join("lore/index.json"),
        }
    }
}

/// Type of index backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexProviderType {
    /// In-process index persisted to a JSON file.
    Memory,
    /// Pinecone serverless index.
    Pinecone,
}

/// Configuration for the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Gemini model name.
    pub model: String,

    /// Gemini API base URL, including the version segment.
    pub base_url: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum tokens in an answer.
    pub max_output_tokens: u32,

    /// What the assistant is an expert on, used in the prompt preamble.
    pub subject: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-exp".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.1,
            max_output_tokens: 1024,
            subject: "the wiki's subject".to_string(),
        }
    }
}

/// Configuration for answering questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Chunks retrieved per question.
    pub top_k: usize,

    /// Most recent turns included in the prompt.
    pub max_history_turns: usize,

    /// Time limit for each of retrieval and generation, in seconds.
    pub timeout_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_history_turns: 3,
            timeout_secs: 60,
        }
    }
}

/// Configuration for splitting pages into chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,

    /// Characters shared by adjacent chunks.
    pub overlap: usize,

    /// Corpus label stored on every chunk.
    pub source: String,
}

impl ChunkingConfig {
    /// Chunker settings with the default separators.
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig::new(self.chunk_size, self.overlap)
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            source: DEFAULT_SOURCE.to_string(),
        }
    }
}

/// Configuration for loading chunks into the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Chunks embedded per request.
    pub embed_batch_size: usize,

    /// Records written per upsert request.
    pub upsert_batch_size: usize,

    /// Embedding requests in flight at once.
    pub concurrency: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            embed_batch_size: 32,
            upsert_batch_size: 100,
            concurrency: 4,
        }
    }
}
