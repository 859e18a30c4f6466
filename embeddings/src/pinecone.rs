//! Pinecone clients.
//!
//! [`PineconeIndex`] covers the data-plane calls the pipeline needs:
//! `vectors/upsert`, `query` and `describe_index_stats`. [`PineconeAdmin`]
//! talks to the control plane to create and describe serverless indexes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::index::{CorpusIndex, IndexMatch, IndexRecord, IndexStats};

const API_VERSION: &str = "2024-07";

/// Control-plane endpoint shared by all Pinecone projects.
pub const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";

/// Seconds to wait when a 429 carries no usable `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Map a non-success response to an error, honouring `Retry-After` on 429.
async fn check_status(response: reqwest::Response, call: &str) -> Result<reqwest::Response> {
    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        return Err(EmbeddingError::RateLimited {
            retry_after_secs: retry_after,
        });
    }

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(EmbeddingError::Index(format!(
            "pinecone {call} returned {status}: {error_text}"
        )));
    }

    Ok(response)
}

/// A [`CorpusIndex`] backed by a Pinecone serverless index.
pub struct PineconeIndex {
    /// Index host, e.g. `https://wiki-rag-abc123.svc.aped-1234.pinecone.io`.
    host: String,

    /// API key.
    api_key: String,

    /// Namespace within the index.
    namespace: Option<String>,

    /// HTTP client.
    client: reqwest::Client,
}

impl PineconeIndex {
    /// Create a client for the index at `host`.
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        let host = host.into();
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{host}")
        };

        Self {
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            namespace: None,
            client: reqwest::Client::new(),
        }
    }

    /// Create a client reading the API key from `PINECONE_API_KEY`.
    pub fn from_env(host: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY").map_err(|_| {
            EmbeddingError::ProviderNotConfigured("PINECONE_API_KEY is not set".to_string())
        })?;
        Ok(Self::new(host, api_key))
    }

    /// Use a namespace for all operations.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    async fn post<B: Serialize + Sync, R: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await?;

        Ok(check_status(response, endpoint).await?.json().await?)
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeStatsResponse {
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    total_vector_count: usize,
}

#[async_trait]
impl CorpusIndex for PineconeIndex {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let request = UpsertRequest {
            vectors: &records,
            namespace: self.namespace.as_deref(),
        };
        let response: UpsertResponse = self.post("vectors/upsert", &request).await?;

        debug!("Pinecone upserted {} vectors", response.upserted_count);
        Ok(response.upserted_count)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<IndexMatch>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let request = QueryRequest {
            vector,
            top_k,
            include_metadata,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };
        let response: QueryResponse = self.post("query", &request).await?;

        debug!("Pinecone returned {} matches", response.matches.len());
        Ok(response.matches)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let response: DescribeStatsResponse = self
            .post("describe_index_stats", &serde_json::json!({}))
            .await?;

        info!(
            "Pinecone index holds {} vectors of dimension {}",
            response.total_vector_count, response.dimension
        );
        Ok(IndexStats {
            total_vectors: response.total_vector_count,
            dimension: response.dimension,
        })
    }
}

/// A serverless index to create through the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerlessIndexSpec {
    /// Index name, unique within the project.
    pub name: String,

    /// Vector dimension.
    pub dimension: usize,

    /// Similarity metric, e.g. `cosine`.
    pub metric: String,

    /// Cloud provider, e.g. `aws`.
    pub cloud: String,

    /// Cloud region, e.g. `us-east-1`.
    pub region: String,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: CreateIndexSpec<'a>,
}

#[derive(Serialize)]
struct CreateIndexSpec<'a> {
    serverless: ServerlessLocation<'a>,
}

#[derive(Serialize)]
struct ServerlessLocation<'a> {
    cloud: &'a str,
    region: &'a str,
}

/// An index as described by the control plane.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexDescription {
    /// Index name.
    pub name: String,

    /// Vector dimension.
    pub dimension: usize,

    /// Similarity metric.
    #[serde(default)]
    pub metric: String,

    /// Data-plane host; empty until the index is provisioned.
    #[serde(default)]
    pub host: String,

    /// Provisioning status.
    #[serde(default)]
    pub status: IndexStatus,
}

/// Provisioning status of an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndexStatus {
    /// Whether the index accepts data-plane calls.
    #[serde(default)]
    pub ready: bool,

    /// Provisioning state, e.g. `Initializing` or `Ready`.
    #[serde(default)]
    pub state: String,
}

/// Pinecone control-plane client.
pub struct PineconeAdmin {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl PineconeAdmin {
    /// Create a client for the public control plane.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: CONTROL_PLANE_URL.to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client reading the API key from `PINECONE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY").map_err(|_| {
            EmbeddingError::ProviderNotConfigured("PINECONE_API_KEY is not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    /// Use a different control-plane URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Data-plane client for an index host, sharing this client's API key.
    pub fn index(&self, host: impl Into<String>) -> PineconeIndex {
        PineconeIndex::new(host, self.api_key.clone())
    }

    /// Describe the index called `name`, or `None` when it does not exist.
    pub async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>> {
        let response = self
            .client
            .get(format!("{}/indexes/{name}", self.base_url))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let description = check_status(response, "describe_index")
            .await?
            .json()
            .await?;
        Ok(Some(description))
    }

    /// Create the index unless it already exists.
    ///
    /// Returns the description and whether the index was created. An
    /// existing index with a different dimension is an error.
    pub async fn ensure_index(
        &self,
        spec: &ServerlessIndexSpec,
    ) -> Result<(IndexDescription, bool)> {
        if let Some(existing) = self.describe_index(&spec.name).await? {
            if existing.dimension != spec.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: spec.dimension,
                    actual: existing.dimension,
                });
            }
            info!("Pinecone index {} already exists", spec.name);
            return Ok((existing, false));
        }

        let request = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: &spec.metric,
            spec: CreateIndexSpec {
                serverless: ServerlessLocation {
                    cloud: &spec.cloud,
                    region: &spec.region,
                },
            },
        };
        let response = self
            .client
            .post(format!("{}/indexes", self.base_url))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&request)
            .send()
            .await?;
        let created: IndexDescription = check_status(response, "create_index")
            .await?
            .json()
            .await?;

        info!(
            "Created Pinecone index {} ({} dimensions, {})",
            created.name, created.dimension, created.metric
        );
        Ok((created, true))
    }

    /// Poll until the index reports ready, at most `max_polls` times.
    pub async fn wait_until_ready(
        &self,
        name: &str,
        interval: Duration,
        max_polls: usize,
    ) -> Result<IndexDescription> {
        for poll in 0..max_polls {
            match self.describe_index(name).await? {
                Some(description) if description.status.ready => return Ok(description),
                Some(description) => {
                    debug!(
                        "Pinecone index {name} is {} (poll {})",
                        description.status.state,
                        poll + 1
                    );
                }
                None => {
                    return Err(EmbeddingError::Index(format!(
                        "pinecone index {name} disappeared while provisioning"
                    )));
                }
            }
            tokio::time::sleep(interval).await;
        }

        Err(EmbeddingError::Index(format!(
            "pinecone index {name} not ready after {max_polls} polls"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_upsert_sends_vectors_with_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .and(header("Api-Key", "pc-key"))
            .and(body_json(serde_json::json!({
                "vectors": [
                    { "id": "chunk_0", "values": [0.5, 0.5], "metadata": { "title": "Marika" } }
                ],
                "namespace": "wiki"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "upsertedCount": 1 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let index = PineconeIndex::new(server.uri(), "pc-key").with_namespace("wiki");
        let written = index
            .upsert(vec![
                IndexRecord::new("chunk_0", vec![0.5, 0.5])
                    .with_metadata(serde_json::json!({ "title": "Marika" })),
            ])
            .await
            .unwrap();

        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_query_maps_matches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_json(serde_json::json!({
                "vector": [1.0, 0.0],
                "topK": 2,
                "includeMetadata": true,
                "includeValues": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "matches": [
                    { "id": "chunk_3", "score": 0.91, "metadata": { "text": "Marika is a god." } },
                    { "id": "chunk_9", "score": 0.42 }
                ],
                "namespace": ""
            })))
            .mount(&server)
            .await;

        let index = PineconeIndex::new(server.uri(), "pc-key");
        let matches = index.query(&[1.0, 0.0], 2, true).await.unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "chunk_3");
        assert_eq!(
            matches[0].metadata,
            Some(serde_json::json!({ "text": "Marika is a god." }))
        );
        assert_eq!(matches[1].metadata, None);
    }

    #[tokio::test]
    async fn test_query_with_no_matches_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "namespace": "" })),
            )
            .mount(&server)
            .await;

        let index = PineconeIndex::new(server.uri(), "pc-key");
        assert!(index.query(&[1.0, 0.0], 5, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_an_index_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/describe_index_stats"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let index = PineconeIndex::new(server.uri(), "pc-key");
        let err = index.stats().await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Index(message) if message.contains("503")));
    }

    #[test]
    fn test_host_without_scheme_uses_https() {
        let index = PineconeIndex::new("wiki-rag.svc.pinecone.io/", "k");
        assert_eq!(index.host, "https://wiki-rag.svc.pinecone.io");
    }

    #[tokio::test]
    async fn test_rate_limit_honours_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let index = PineconeIndex::new(server.uri(), "pc-key");
        let err = index.query(&[1.0, 0.0], 1, true).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::RateLimited {
                retry_after_secs: 7
            }
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_without_header_uses_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let index = PineconeIndex::new(server.uri(), "pc-key");
        let err = index
            .upsert(vec![IndexRecord::new("chunk_0", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS
            }
        ));
    }

    fn wiki_spec() -> ServerlessIndexSpec {
        ServerlessIndexSpec {
            name: "wiki-rag".to_string(),
            dimension: 384,
            metric: "cosine".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
        }
    }

    fn description(dimension: usize, ready: bool) -> serde_json::Value {
        let state = if ready { "Ready" } else { "Initializing" };
        serde_json::json!({
            "name": "wiki-rag",
            "dimension": dimension,
            "metric": "cosine",
            "host": "wiki-rag-abc.svc.pinecone.io",
            "status": { "ready": ready, "state": state }
        })
    }

    #[tokio::test]
    async fn test_ensure_index_creates_missing_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/wiki-rag"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .and(header("Api-Key", "pc-key"))
            .and(body_json(serde_json::json!({
                "name": "wiki-rag",
                "dimension": 384,
                "metric": "cosine",
                "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(description(384, false)))
            .expect(1)
            .mount(&server)
            .await;

        let admin = PineconeAdmin::new("pc-key").with_base_url(server.uri());
        let (created, was_created) = admin.ensure_index(&wiki_spec()).await.unwrap();

        assert!(was_created);
        assert_eq!(created.host, "wiki-rag-abc.svc.pinecone.io");
        assert!(!created.status.ready);
    }

    #[tokio::test]
    async fn test_ensure_index_keeps_existing_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/wiki-rag"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(384, true)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let admin = PineconeAdmin::new("pc-key").with_base_url(server.uri());
        let (existing, was_created) = admin.ensure_index(&wiki_spec()).await.unwrap();

        assert!(!was_created);
        assert!(existing.status.ready);
    }

    #[tokio::test]
    async fn test_existing_index_with_other_dimension_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/wiki-rag"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(1536, true)))
            .mount(&server)
            .await;

        let admin = PineconeAdmin::new("pc-key").with_base_url(server.uri());
        let err = admin.ensure_index(&wiki_spec()).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 384,
                actual: 1536
            }
        ));
    }

    #[tokio::test]
    async fn test_wait_until_ready_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/wiki-rag"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(384, false)))
            .expect(3)
            .mount(&server)
            .await;

        let admin = PineconeAdmin::new("pc-key").with_base_url(server.uri());
        let err = admin
            .wait_until_ready("wiki-rag", Duration::from_millis(1), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::Index(message) if message.contains("not ready")));
    }

    #[tokio::test]
    async fn test_wait_until_ready_returns_ready_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes/wiki-rag"))
            .respond_with(ResponseTemplate::new(200).set_body_json(description(384, true)))
            .mount(&server)
            .await;

        let admin = PineconeAdmin::new("pc-key").with_base_url(server.uri());
        let ready = admin
            .wait_until_ready("wiki-rag", Duration::from_millis(1), 3)
            .await
            .unwrap();
        assert_eq!(ready.name, "wiki-rag");
    }
}
