//! Chunk persistence.
//!
//! The `ChunkStore` writes the chunk records produced by one chunking run to
//! a data directory, together with a small summary of the run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::chunker::{Chunk, ChunkerConfig};
use crate::error::{Result, StorageError};

const CHUNKS_FILE: &str = "text_chunks.json";
const SUMMARY_FILE: &str = "chunking_summary.json";
const SAMPLE_CHUNKS: usize = 3;

/// Statistics about a chunking run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSummary {
    /// Number of chunks produced.
    pub total_chunks: usize,

    /// Characters across all chunks, overlap included.
    pub total_characters: usize,

    /// Mean chunk length in characters.
    pub average_chunk_length: f64,

    /// Configured window size.
    pub chunk_size: usize,

    /// Configured overlap.
    pub chunk_overlap: usize,

    /// The first few chunks, for eyeballing.
    pub sample_chunks: Vec<Chunk>,
}

impl ChunkSummary {
    /// Summarise `chunks` produced with `config`.
    pub fn from_chunks(chunks: &[Chunk], config: &ChunkerConfig) -> Self {
        let total_characters: usize = chunks.iter().map(Chunk::char_len).sum();
        let average_chunk_length = if chunks.is_empty() {
            0.0
        } else {
            total_characters as f64 / chunks.len() as f64
        };

        Self {
            total_chunks: chunks.len(),
            total_characters,
            average_chunk_length,
            chunk_size: config.chunk_size,
            chunk_overlap: config.overlap,
            sample_chunks: chunks.iter().take(SAMPLE_CHUNKS).cloned().collect(),
        }
    }
}

/// Storage for chunk records in a data directory.
pub struct ChunkStore {
    /// Root directory.
    root: PathBuf,
}

impl ChunkStore {
    /// Open a store at the given directory, creating it if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::CreateDirectory(format!("{}: {e}", root.display())))?;

        Ok(Self { root })
    }

    /// Path of the chunk records file.
    pub fn chunks_path(&self) -> PathBuf {
        self.root.join(CHUNKS_FILE)
    }

    /// Path of the summary file.
    pub fn summary_path(&self) -> PathBuf {
        self.root.join(SUMMARY_FILE)
    }

    /// Write all chunk records, replacing any previous run.
    pub async fn save_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let content = serde_json::to_string_pretty(chunks)?;
        write_atomic(&self.chunks_path(), &content).await?;
        info!(
            "Saved {} chunks to {}",
            chunks.len(),
            self.chunks_path().display()
        );
        Ok(())
    }

    /// Read the chunk records written by [`ChunkStore::save_chunks`].
    pub async fn load_chunks(&self) -> Result<Vec<Chunk>> {
        load_chunks(self.chunks_path()).await
    }

    /// Write the run summary.
    pub async fn save_summary(&self, summary: &ChunkSummary) -> Result<()> {
        let content = serde_json::to_string_pretty(summary)?;
        write_atomic(&self.summary_path(), &content).await?;
        debug!("Saved chunk summary to {}", self.summary_path().display());
        Ok(())
    }
}

/// Read chunk records from a JSON file.
pub async fn load_chunks(path: impl AsRef<Path>) -> Result<Vec<Chunk>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| StorageError::ReadFile(format!("{}: {e}", path.display())))?;

    let chunks: Vec<Chunk> = serde_json::from_str(&content)?;
    info!("Loaded {} chunks from {}", chunks.len(), path.display());
    Ok(chunks)
}

/// Write using a temp file and rename so readers never see a partial file.
async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content)
        .await
        .map_err(|e| StorageError::WriteFile(format!("{}: {e}", temp_path.display())))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| StorageError::WriteFile(format!("{}: {e}", path.display())))?;
    Ok(())
}
