//! Embedding cache for repeated queries.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::EmbeddingProvider;

/// Cache entry for an embedding.
#[derive(Debug, Clone)]
struct CacheEntry {
    embedding: Embedding,
    /// Insertion sequence number; lower is older.
    seq: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
}

/// Bounded in-memory cache of embeddings keyed by model and text.
///
/// When full, the least recently inserted entry is evicted.
pub struct EmbeddingCache {
    cache: RwLock<CacheState>,
    max_entries: usize,
}

impl EmbeddingCache {
    /// Create a new cache holding at most `max_entries` embeddings.
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: RwLock::new(CacheState::default()),
            max_entries,
        }
    }

    /// Compute a hash for cache lookup.
    fn hash_key(text: &str, model: &str) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        model.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    /// Get an embedding from the cache.
    pub async fn get(&self, text: &str, model: &str) -> Option<Embedding> {
        let key = Self::hash_key(text, model);
        let cache = self.cache.read().await;
        cache.entries.get(&key).map(|e| e.embedding.clone())
    }

    /// Put an embedding in the cache.
    pub async fn put(&self, text: &str, model: &str, embedding: Embedding) {
        if self.max_entries == 0 {
            return;
        }

        let key = Self::hash_key(text, model);
        let mut cache = self.cache.write().await;
        let seq = cache.next_seq;
        cache.next_seq += 1;

        if cache.entries.len() >= self.max_entries && !cache.entries.contains_key(&key) {
            if let Some(oldest_key) = cache
                .entries
                .iter()
                .min_by_key(|(_, v)| v.seq)
                .map(|(k, _)| k.clone())
            {
                cache.entries.remove(&oldest_key);
            }
        }

        cache.entries.insert(key, CacheEntry { embedding, seq });
        debug!("Cached embedding for text (model: {model})");
    }

    /// Number of cached embeddings.
    pub async fn len(&self) -> usize {
        self.cache.read().await.entries.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.entries.is_empty()
    }
}

/// An [`EmbeddingProvider`] that consults an [`EmbeddingCache`] before
/// delegating to the wrapped provider.
pub struct CachedProvider<P> {
    inner: P,
    cache: EmbeddingCache,
}

impl<P: EmbeddingProvider> CachedProvider<P> {
    /// Wrap `inner` with a cache of `max_entries` embeddings.
    pub fn new(inner: P, max_entries: usize) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::new(max_entries),
        }
    }

    /// Access the underlying cache.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let model = self.inner.model();
        let mut results: Vec<Option<Embedding>> = Vec::with_capacity(texts.len());
        let mut missing = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let cached = self.cache.get(text, model).await;
            if cached.is_none() {
                missing.push(i);
            }
            results.push(cached);
        }

        if !missing.is_empty() {
            let to_embed: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&to_embed).await?;
            if fresh.len() != to_embed.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    to_embed.len(),
                    fresh.len()
                )));
            }
            for (&i, embedding) in missing.iter().zip(fresh) {
                self.cache.put(&texts[i], model, embedding.clone()).await;
                results[i] = Some(embedding);
            }
        }

        debug!(
            "Embedding cache served {} of {} texts",
            texts.len() - missing.len(),
            texts.len()
        );

        Ok(results.into_iter().flatten().collect())
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}
