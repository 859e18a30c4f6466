//! Language model clients.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::{GOOGLE_API_KEY_ENV, GenerationConfig};
use crate::error::{RagError, Result};

/// Trait for text completion models.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Get the name of this model client.
    fn name(&self) -> &str;

    /// Complete a single prompt. Sampling parameters belong to the client.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Client for the Gemini `generateContent` API.
pub struct GeminiClient {
    /// API key.
    api_key: String,

    /// API base URL, including the version segment.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Model name.
    model: String,

    /// Sampling temperature.
    temperature: f32,

    /// Maximum tokens in a completion.
    max_output_tokens: u32,
}

impl GeminiClient {
    /// Create a client with the given API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(api_key, &GenerationConfig::default())
    }

    /// Create a client with the given API key and settings.
    pub fn with_config(api_key: impl Into<String>, config: &GenerationConfig) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: config.base_url.clone(),
            client: reqwest::Client::new(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }

    /// Create a client reading the API key from `GOOGLE_API_KEY`.
    pub fn from_env(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(GOOGLE_API_KEY_ENV).map_err(|_| {
            RagError::Configuration(format!("{GOOGLE_API_KEY_ENV} is not set"))
        })?;
        Ok(Self::with_config(api_key, config))
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            "Requesting completion from {} for a {} character prompt",
            self.model,
            prompt.len()
        );

        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
            },
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Generation(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "gemini returned {status}: {error_text}"
            )));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("invalid response: {e}")))?;

        if let Some(reason) = result.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(RagError::Generation(format!("prompt blocked: {reason}")));
        }

        let candidate = result
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Generation("no candidates returned".to_string()))?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if let Some(usage) = result.usage_metadata {
            debug!("Completion used {} tokens", usage.total_token_count);
        }
        Ok(text)
    }
}

/// Gemini API response format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new("test-key").with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_complete_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash-exp:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": "Who is Marika?" }] }],
                "generationConfig": { "maxOutputTokens": 1024 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{ "text": "Marika is " }, { "text": "the Eternal." }]
                    },
                    "finishReason": "STOP"
                }],
                "usageMetadata": { "totalTokenCount": 42 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client(&server).complete("Who is Marika?").await.unwrap();
        assert_eq!(answer, "Marika is the Eternal.");
    }

    #[tokio::test]
    async fn test_http_error_is_a_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server).complete("q").await.unwrap_err();
        assert!(err.is_generation());
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_blocked_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).complete("q").await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        assert!(client(&server).complete("q").await.is_err());
    }
}
