//! Loading chunk records into the corpus index.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use lore_corpus::Chunk;
use lore_embeddings::{CorpusIndex, Embedding, EmbeddingError, EmbeddingProvider, IndexRecord};

use crate::config::IndexingConfig;
use crate::error::{RagError, Result};
use crate::retriever::ChunkPayload;

/// Outcome of an indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Chunks read.
    pub chunks: usize,

    /// Records the index accepted.
    pub upserted: usize,

    /// Upsert batches that failed and were skipped.
    pub failed_batches: usize,

    /// Vectors in the index afterwards.
    pub total_vectors: usize,
}

/// Embeds chunks and writes them to a corpus index.
pub struct CorpusIndexer {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn CorpusIndex>,
    config: IndexingConfig,
}

impl CorpusIndexer {
    /// Create an indexer.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn CorpusIndex>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Embed and upsert every chunk.
    ///
    /// Embedding requests run concurrently up to the configured limit; any
    /// embedding failure aborts the run. A failed upsert batch is logged and
    /// counted, and the remaining batches are still written.
    pub async fn index(&self, chunks: &[Chunk]) -> Result<IndexReport> {
        let vectors = self.embed_all(chunks).await?;

        let records = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| -> Result<IndexRecord> {
                let metadata = serde_json::to_value(ChunkPayload::from(chunk))?;
                Ok(IndexRecord::new(chunk.id.clone(), vector).with_metadata(metadata))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut report = IndexReport {
            chunks: chunks.len(),
            ..IndexReport::default()
        };

        let batch_size = self.config.upsert_batch_size.max(1);
        let total_batches = records.len().div_ceil(batch_size);
        for (i, batch) in records.chunks(batch_size).enumerate() {
            match self.index.upsert(batch.to_vec()).await {
                Ok(count) => {
                    report.upserted += count;
                    info!("Upserted batch {}/{total_batches}", i + 1);
                }
                Err(e) => {
                    report.failed_batches += 1;
                    warn!("Upsert batch {}/{total_batches} failed: {e}", i + 1);
                }
            }
        }

        self.index.persist().await.map_err(RagError::Indexing)?;
        report.total_vectors = self
            .index
            .stats()
            .await
            .map_err(RagError::Indexing)?
            .total_vectors;

        info!(
            "Indexed {} of {} chunks into {} ({} failed batches)",
            report.upserted,
            report.chunks,
            self.index.name(),
            report.failed_batches
        );
        Ok(report)
    }

    async fn embed_all(&self, chunks: &[Chunk]) -> Result<Vec<Embedding>> {
        let batch_size = self.config.embed_batch_size.max(1);
        let concurrency = self.config.concurrency.max(1);
        let embedder = &self.embedder;

        let batches: Vec<Vec<Embedding>> = stream::iter(chunks.chunks(batch_size))
            .map(|batch| {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                async move {
                    let vectors = embedder.embed_batch(&texts).await?;
                    if vectors.len() != texts.len() {
                        return Err(EmbeddingError::InvalidResponse(format!(
                            "expected {} embeddings, got {}",
                            texts.len(),
                            vectors.len()
                        )));
                    }
                    Ok::<_, EmbeddingError>(vectors)
                }
            })
            .buffered(concurrency)
            .try_collect()
            .await
            .map_err(RagError::Indexing)?;

        let vectors: Vec<Embedding> = batches.into_iter().flatten().collect();
        info!("Embedded {} chunks", vectors.len());
        Ok(vectors)
    }
}
