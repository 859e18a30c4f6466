//! Corpus indexes: chunk vectors plus metadata, queried by similarity.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::{find_top_k, normalize};

/// A vector to store in an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Unique identifier.
    pub id: String,

    /// The embedding vector.
    pub values: Embedding,

    /// Associated metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl IndexRecord {
    /// Create a new record.
    pub fn new(id: impl Into<String>, values: Embedding) -> Self {
        Self {
            id: id.into(),
            values,
            metadata: None,
        }
    }

    /// Attach metadata to the record.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A ranked match returned by [`CorpusIndex::query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatch {
    /// ID of the matched record.
    pub id: String,

    /// Similarity score; higher is more relevant.
    pub score: f32,

    /// Record metadata, when requested.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Summary statistics of an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of stored vectors.
    pub total_vectors: usize,

    /// Vector dimension.
    pub dimension: usize,
}

/// A store of chunk vectors that answers top-k similarity queries.
///
/// Implementations are internally synchronised and may be shared between
/// readers and writers.
#[async_trait]
pub trait CorpusIndex: Send + Sync {
    /// Get the name of this index backend.
    fn name(&self) -> &str;

    /// Insert or replace records. Returns the number of records written.
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize>;

    /// Return up to `top_k` matches, best first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<IndexMatch>>;

    /// Describe the index.
    async fn stats(&self) -> Result<IndexStats>;

    /// Flush written records to durable storage. Remote indexes are durable
    /// on upsert and do nothing here.
    async fn persist(&self) -> Result<()> {
        Ok(())
    }
}

/// An entry in the in-memory index.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    embedding: Embedding,
    metadata: Option<serde_json::Value>,
}

/// An in-memory cosine-similarity index.
///
/// Entries are kept ordered by id so equal scores always rank the same way.
pub struct MemoryIndex {
    /// Stored entries.
    entries: RwLock<BTreeMap<String, IndexEntry>>,

    /// Expected dimension of embeddings.
    dimension: usize,

    /// Whether embeddings should be normalized.
    normalize_embeddings: bool,

    /// File written by [`CorpusIndex::persist`], if any.
    path: Option<PathBuf>,
}

impl MemoryIndex {
    /// Create a new empty index.
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            dimension,
            normalize_embeddings: true,
            path: None,
        }
    }

    /// Open the index backed by `path`, loading it if the file exists.
    ///
    /// [`CorpusIndex::persist`] writes back to the same file.
    pub async fn open(path: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        let path = path.into();
        let mut index = if fs::try_exists(&path).await? {
            Self::load(&path, dimension).await?
        } else {
            debug!("No index at {}, starting empty", path.display());
            Self::new(dimension)
        };
        index.path = Some(path);
        Ok(index)
    }

    /// Disable embedding normalization.
    pub fn without_normalization(mut self) -> Self {
        self.normalize_embeddings = false;
        self
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Get the number of entries in the index.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the index is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Check if an ID exists in the index.
    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Clear the index.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        info!("Cleared memory index");
    }

    /// Persist the index as JSON, replacing the file atomically.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = {
            let entries = self.entries.read().await;
            let entries: Vec<&IndexEntry> = entries.values().collect();
            serde_json::to_string(&entries)?
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, path).await?;

        info!("Saved memory index to {}", path.display());
        Ok(())
    }

    /// Load an index previously written by [`MemoryIndex::save`].
    pub async fn load(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        let entries: Vec<IndexEntry> = serde_json::from_str(&content)?;

        let index = Self::new(dimension);
        {
            let mut map = index.entries.write().await;
            for entry in entries {
                index.check_dimension(entry.embedding.len())?;
                map.insert(entry.id.clone(), entry);
            }
            info!("Loaded {} entries into memory index", map.len());
        }
        Ok(index)
    }
}

#[async_trait]
impl CorpusIndex for MemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        for record in &records {
            self.check_dimension(record.values.len())?;
        }

        let count = records.len();
        let mut entries = self.entries.write().await;
        for record in records {
            let mut embedding = record.values;
            if self.normalize_embeddings {
                normalize(&mut embedding);
            }
            debug!("Upserted vector: {}", record.id);
            entries.insert(
                record.id.clone(),
                IndexEntry {
                    id: record.id,
                    embedding,
                    metadata: record.metadata,
                },
            );
        }

        Ok(count)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<IndexMatch>> {
        self.check_dimension(vector.len())?;

        let mut query = vector.to_vec();
        if self.normalize_embeddings {
            normalize(&mut query);
        }

        let entries = self.entries.read().await;
        let candidates = entries
            .values()
            .map(|e| (e.id.as_str(), e.embedding.as_slice()));
        let results = find_top_k(&query, candidates, top_k)?;

        Ok(results
            .into_iter()
            .map(|result| {
                let metadata = if include_metadata {
                    entries.get(&result.id).and_then(|e| e.metadata.clone())
                } else {
                    None
                };
                IndexMatch {
                    id: result.id,
                    score: result.score,
                    metadata,
                }
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            total_vectors: self.len().await,
            dimension: self.dimension,
        })
    }

    async fn persist(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.save(path).await,
            None => Ok(()),
        }
    }
}
