//! Similarity retrieval of chunks for a question.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use lore_corpus::{Chunk, ChunkMetadata};
use lore_embeddings::{CorpusIndex, EmbeddingProvider, IndexMatch};

use crate::error::{RagError, Result};

/// A chunk returned for a question, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// The matched chunk.
    pub chunk: Chunk,

    /// Similarity to the question, higher is more relevant.
    pub score: f32,
}

/// Metadata stored with every vector in the corpus index.
///
/// It carries the chunk text so a match can be rendered without a second
/// lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// The chunk text.
    pub text: String,

    /// Title of the source page.
    pub title: String,

    /// URL of the source page.
    #[serde(default)]
    pub url: String,

    /// Corpus label.
    #[serde(default)]
    pub source: String,

    /// Position of the chunk within its page.
    #[serde(default, deserialize_with = "lenient_count")]
    pub chunk_index: usize,

    /// Number of chunks cut from the page.
    #[serde(default, deserialize_with = "lenient_count")]
    pub total_chunks: usize,
}

/// Decode a count that an index may have stored as a float (`2.0`).
///
/// Values that are not a whole non-negative number decode as 0 so the match
/// itself survives.
fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let count = match &value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        _ => None,
    };
    Ok(count
        .and_then(|c| usize::try_from(c).ok())
        .unwrap_or_default())
}

impl ChunkPayload {
    /// Rebuild the chunk stored under `id`.
    pub fn into_chunk(self, id: impl Into<String>) -> Chunk {
        Chunk {
            id: id.into(),
            text: self.text,
            metadata: ChunkMetadata {
                url: self.url,
                title: self.title,
                source: self.source,
                chunk_index: self.chunk_index,
                total_chunks: self.total_chunks,
            },
        }
    }
}

impl From<&Chunk> for ChunkPayload {
    fn from(chunk: &Chunk) -> Self {
        Self {
            text: chunk.text.clone(),
            title: chunk.metadata.title.clone(),
            url: chunk.metadata.url.clone(),
            source: chunk.metadata.source.clone(),
            chunk_index: chunk.metadata.chunk_index,
            total_chunks: chunk.metadata.total_chunks,
        }
    }
}

/// Finds the chunks most relevant to a question.
#[async_trait]
pub trait ChunkRetriever: Send + Sync {
    /// Return at most `top_k` chunks, best first. An empty corpus yields an
    /// empty result.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// Retriever that embeds the question and queries a corpus index.
pub struct EmbeddingRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn CorpusIndex>,
}

impl EmbeddingRetriever {
    /// Create a retriever over the given embedder and index.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn CorpusIndex>) -> Self {
        Self { embedder, index }
    }
}

#[async_trait]
impl ChunkRetriever for EmbeddingRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await.map_err(RagError::Retrieval)?;
        let matches = self
            .index
            .query(&vector, top_k, true)
            .await
            .map_err(RagError::Retrieval)?;
        debug!(
            "Index {} returned {} matches",
            self.index.name(),
            matches.len()
        );

        let mut chunks: Vec<RetrievedChunk> =
            matches.into_iter().filter_map(to_retrieved).collect();
        chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
        chunks.truncate(top_k);
        Ok(chunks)
    }
}

fn to_retrieved(m: IndexMatch) -> Option<RetrievedChunk> {
    let Some(metadata) = m.metadata else {
        warn!("Skipping match {} without metadata", m.id);
        return None;
    };

    match serde_json::from_value::<ChunkPayload>(metadata) {
        Ok(payload) => Some(RetrievedChunk {
            chunk: payload.into_chunk(m.id),
            score: m.score,
        }),
        Err(e) => {
            warn!("Skipping match {} with malformed metadata: {e}", m.id);
            None
        }
    }
}
