//! Construction of the configured collaborators.
//!
//! Credentials are read from the environment here; a selected provider
//! without its credentials is a configuration error.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use lore_embeddings::{
    CachedProvider, CorpusIndex, EmbeddingError, EmbeddingProvider, IndexDescription,
    MemoryIndex, OpenAIProvider, PineconeAdmin, PineconeIndex, ServerlessIndexSpec,
};

use crate::config::{
    EmbeddingConfig, EmbeddingProviderType, GenerationConfig, IndexConfig, IndexProviderType,
    OPENAI_API_KEY_ENV,
};
use crate::error::{RagError, Result};
use crate::llm::{GeminiClient, LanguageModel};

fn openai_provider(config: &EmbeddingConfig) -> Result<OpenAIProvider> {
    let mut provider = match config.provider {
        EmbeddingProviderType::OpenAI => OpenAIProvider::new(),
        EmbeddingProviderType::Local => {
            let base_url = config.base_url.clone().ok_or_else(|| {
                RagError::Configuration(
                    "embedding.base_url is required for the local provider".to_string(),
                )
            })?;
            OpenAIProvider::local(base_url)
        }
    };

    if let Some(base_url) = &config.base_url {
        provider = provider.with_base_url(base_url);
    }
    if let Some(model) = &config.model {
        provider = provider.with_model(model);
    }
    provider = provider.with_dimension(config.dimension);

    if !provider.is_available() {
        return Err(RagError::Configuration(format!(
            "{OPENAI_API_KEY_ENV} is not set"
        )));
    }
    Ok(provider)
}

/// Embedder for bulk indexing. Never cached, every chunk is embedded once.
pub fn embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(openai_provider(config)?))
}

/// Embedder for questions, behind the embedding cache when enabled.
pub fn query_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider = openai_provider(config)?;
    if config.cache_enabled {
        info!(
            "Caching up to {} query embeddings",
            config.cache_max_entries
        );
        return Ok(Arc::new(CachedProvider::new(
            provider,
            config.cache_max_entries,
        )));
    }
    Ok(Arc::new(provider))
}

/// Open the configured corpus index.
pub async fn open_index(config: &IndexConfig, dimension: usize) -> Result<Arc<dyn CorpusIndex>> {
    match config.provider {
        IndexProviderType::Memory => {
            let index = MemoryIndex::open(&config.memory_path, dimension)
                .await
                .map_err(|e| {
                    RagError::Configuration(format!(
                        "cannot open index at {}: {e}",
                        config.memory_path.display()
                    ))
                })?;
            Ok(Arc::new(index))
        }
        IndexProviderType::Pinecone => {
            let host = config.host.clone().ok_or_else(|| {
                RagError::Configuration("index.host is required for the pinecone index".to_string())
            })?;
            let mut index = PineconeIndex::from_env(host).map_err(|e| match e {
                EmbeddingError::ProviderNotConfigured(msg) => RagError::Configuration(msg),
                other => RagError::Configuration(other.to_string()),
            })?;
            if let Some(namespace) = &config.namespace {
                index = index.with_namespace(namespace);
            }
            Ok(Arc::new(index))
        }
    }
}

/// Polls allowed while a new Pinecone index provisions.
const MAX_SETUP_POLLS: usize = 120;

/// Outcome of [`setup_pinecone`].
#[derive(Debug, Clone, PartialEq)]
pub struct SetupReport {
    /// The ready index.
    pub index: IndexDescription,

    /// Whether this run created the index.
    pub created: bool,

    /// Vectors currently stored, read back over the data plane.
    pub total_vectors: usize,
}

/// Control-plane client with the key from the environment.
pub fn pinecone_admin() -> Result<PineconeAdmin> {
    PineconeAdmin::from_env().map_err(|e| RagError::Configuration(e.to_string()))
}

/// The serverless index described by `config`, using cosine similarity.
pub fn serverless_spec(config: &IndexConfig, dimension: usize) -> ServerlessIndexSpec {
    ServerlessIndexSpec {
        name: config.name.clone(),
        dimension,
        metric: "cosine".to_string(),
        cloud: config.cloud.clone(),
        region: config.region.clone(),
    }
}

/// Create the Pinecone index if needed, wait until it is ready, then check
/// the data plane answers.
pub async fn setup_pinecone(
    admin: &PineconeAdmin,
    spec: &ServerlessIndexSpec,
    poll_interval: Duration,
) -> Result<SetupReport> {
    let (description, created) = admin.ensure_index(spec).await.map_err(RagError::Indexing)?;

    let index = if description.status.ready {
        description
    } else {
        info!("Waiting for Pinecone index {} to be ready", spec.name);
        admin
            .wait_until_ready(&spec.name, poll_interval, MAX_SETUP_POLLS)
            .await
            .map_err(RagError::Indexing)?
    };

    let stats = admin
        .index(index.host.as_str())
        .stats()
        .await
        .map_err(RagError::Indexing)?;

    Ok(SetupReport {
        index,
        created,
        total_vectors: stats.total_vectors,
    })
}

/// Create the configured language model client.
pub fn language_model(config: &GenerationConfig) -> Result<Arc<dyn LanguageModel>> {
    Ok(Arc::new(GeminiClient::from_env(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_local_provider_needs_a_base_url() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderType::Local,
            ..EmbeddingConfig::default()
        };
        let err = embedder(&config).err().unwrap();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_local_provider_needs_no_key() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderType::Local,
            base_url: Some("http://localhost:8080/v1".to_string()),
            ..EmbeddingConfig::default()
        };
        let provider = query_embedder(&config).unwrap();
        assert_eq!(provider.dimension(), 384);
    }

    #[tokio::test]
    async fn test_memory_index_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let config = IndexConfig {
            memory_path: temp_dir.path().join("index.json"),
            ..IndexConfig::default()
        };

        let index = open_index(&config, 4).await.unwrap();
        let stats = index.stats().await.unwrap();
        assert_eq!(stats.total_vectors, 0);
        assert_eq!(stats.dimension, 4);
    }

    #[tokio::test]
    async fn test_setup_creates_index_and_checks_the_data_plane() {
        let server = MockServer::start().await;
        let described = |ready: bool| {
            serde_json::json!({
                "name": "wiki-rag",
                "dimension": 384,
                "metric": "cosine",
                "host": server.uri(),
                "status": { "ready": ready }
            })
        };
        Mock::given(method("GET"))
            .and(path("/indexes/wiki-rag"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .respond_with(ResponseTemplate::new(201).set_body_json(described(false)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/indexes/wiki-rag"))
            .respond_with(ResponseTemplate::new(200).set_body_json(described(true)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/describe_index_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "dimension": 384,
                "totalVectorCount": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let admin = PineconeAdmin::new("pc-key").with_base_url(server.uri());
        let spec = serverless_spec(&IndexConfig::default(), 384);
        let report = setup_pinecone(&admin, &spec, Duration::from_millis(1))
            .await
            .unwrap();

        assert!(report.created);
        assert!(report.index.status.ready);
        assert_eq!(report.total_vectors, 0);
    }

    #[test]
    fn test_serverless_spec_follows_config() {
        let spec = serverless_spec(&IndexConfig::default(), 384);
        assert_eq!(
            spec,
            ServerlessIndexSpec {
                name: "wiki-rag".to_string(),
                dimension: 384,
                metric: "cosine".to_string(),
                cloud: "aws".to_string(),
                region: "us-east-1".to_string(),
            }
        );
    }
}
