//! The question answering engine.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info};

use lore_embeddings::{CorpusIndex, EmbeddingProvider};

use crate::config::{QueryConfig, RagConfig};
use crate::context::{format_evidence, format_history};
use crate::conversation::{ConversationHistory, ConversationTurn};
use crate::error::{RagError, Result};
use crate::generator::{AnswerGenerator, FALLBACK_ANSWER};
use crate::llm::LanguageModel;
use crate::providers;
use crate::retriever::{ChunkRetriever, EmbeddingRetriever, RetrievedChunk};

/// Stages of a single `ask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskState {
    /// Embedding the question and querying the index.
    Retrieving,
    /// Nothing was retrieved; the fallback answer will be used.
    EmptyResult,
    /// At least one chunk was retrieved.
    HasEvidence,
    /// Waiting for the language model.
    Generating,
    /// Appending the turn to the history.
    Recording,
    /// Finished successfully.
    Done,
    /// Finished with an error; the history is unchanged.
    Failed,
}

fn enter(state: AskState) {
    debug!("ask: {state:?}");
}

/// The result of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    /// The answer text, generated or fallback.
    pub answer: String,

    /// The chunks the answer was grounded on, best first.
    pub chunks: Vec<RetrievedChunk>,

    /// `false` when nothing was retrieved and the fallback answer was used.
    pub grounded: bool,
}

/// Answers questions over the indexed corpus, one conversation turn at a time.
///
/// The engine holds no conversation state. Each session owns a
/// [`ConversationHistory`] and lends it to [`RagEngine::ask`], which appends
/// exactly one turn on success and leaves it untouched on failure.
pub struct RagEngine {
    retriever: Arc<dyn ChunkRetriever>,
    generator: AnswerGenerator,
    config: QueryConfig,
    timeout: Duration,
}

impl RagEngine {
    /// Create a new engine builder.
    pub fn builder() -> RagEngineBuilder {
        RagEngineBuilder::new()
    }

    /// Build an engine from configuration, reading credentials from the
    /// environment.
    pub async fn from_config(config: &RagConfig) -> Result<Self> {
        config.validate()?;

        let embedder = providers::query_embedder(&config.embedding)?;
        let index = providers::open_index(&config.index, config.embedding.dimension).await?;
        let model = providers::language_model(&config.generation)?;

        info!(
            "Answering with {} embeddings, {} index and {} model",
            embedder.name(),
            index.name(),
            model.name()
        );

        Self::builder()
            .with_embedder(embedder)
            .with_index(index)
            .with_language_model(model)
            .with_subject(&config.generation.subject)
            .with_query_config(config.query.clone())
            .build()
    }

    /// Get the query configuration.
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Retrieve the chunks for a question within the configured time limit.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>> {
        timeout(
            self.timeout,
            self.retriever.retrieve(question, self.config.top_k),
        )
        .await
        .map_err(|_| RagError::RetrievalTimeout(self.timeout))?
    }

    /// Answer a question in the context of `history`.
    ///
    /// On success the question and answer are appended to `history`, which
    /// is then the updated conversation. When nothing relevant is retrieved
    /// the model is not called and the fallback answer is recorded instead.
    pub async fn ask(
        &self,
        question: &str,
        history: &mut ConversationHistory,
    ) -> Result<AskResponse> {
        let response = match self.answer(question, history).await {
            Ok(response) => response,
            Err(e) => {
                enter(AskState::Failed);
                debug!("ask failed: {e}");
                return Err(e);
            }
        };

        enter(AskState::Recording);
        history.push(ConversationTurn::new(question, response.answer.clone()));
        enter(AskState::Done);

        Ok(response)
    }

    async fn answer(&self, question: &str, history: &ConversationHistory) -> Result<AskResponse> {
        enter(AskState::Retrieving);
        let chunks = self.retrieve(question).await?;

        if chunks.is_empty() {
            enter(AskState::EmptyResult);
            return Ok(AskResponse {
                answer: FALLBACK_ANSWER.to_string(),
                chunks,
                grounded: false,
            });
        }

        enter(AskState::HasEvidence);
        let evidence = format_evidence(&chunks);
        let history_block = format_history(history, self.config.max_history_turns);

        enter(AskState::Generating);
        let answer = timeout(
            self.timeout,
            self.generator.generate(question, &evidence, &history_block),
        )
        .await
        .map_err(|_| RagError::GenerationTimeout(self.timeout))??;

        Ok(AskResponse {
            answer,
            chunks,
            grounded: true,
        })
    }

    /// Start the conversation over.
    pub fn clear_history(&self, history: &mut ConversationHistory) {
        history.clear();
        info!("Conversation history cleared");
    }
}

/// Builder for [`RagEngine`].
pub struct RagEngineBuilder {
    retriever: Option<Arc<dyn ChunkRetriever>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<dyn CorpusIndex>>,
    model: Option<Arc<dyn LanguageModel>>,
    subject: Option<String>,
    config: QueryConfig,
    timeout: Option<Duration>,
}

impl RagEngineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            retriever: None,
            embedder: None,
            index: None,
            model: None,
            subject: None,
            config: QueryConfig::default(),
            timeout: None,
        }
    }

    /// Use a ready-made retriever instead of an embedder and an index.
    pub fn with_retriever(mut self, retriever: Arc<dyn ChunkRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the embedding provider used for questions.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the corpus index.
    pub fn with_index(mut self, index: Arc<dyn CorpusIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the language model.
    pub fn with_language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Set what the assistant is an expert on.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the query configuration.
    pub fn with_query_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the time limit derived from `timeout_secs`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<RagEngine> {
        if self.config.top_k == 0 {
            return Err(RagError::Configuration(
                "top_k must be at least 1".to_string(),
            ));
        }

        let retriever: Arc<dyn ChunkRetriever> = match (self.retriever, self.embedder, self.index)
        {
            (Some(retriever), _, _) => retriever,
            (None, Some(embedder), Some(index)) => {
                Arc::new(EmbeddingRetriever::new(embedder, index))
            }
            _ => {
                return Err(RagError::Configuration(
                    "a retriever, or an embedder and an index, is required".to_string(),
                ));
            }
        };

        let model = self.model.ok_or_else(|| {
            RagError::Configuration("a language model is required".to_string())
        })?;
        let mut generator = AnswerGenerator::new(model);
        if let Some(subject) = self.subject {
            generator = generator.with_subject(subject);
        }

        let timeout = self
            .timeout
            .unwrap_or(Duration::from_secs(self.config.timeout_secs));

        Ok(RagEngine {
            retriever,
            generator,
            config: self.config,
            timeout,
        })
    }
}

impl Default for RagEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoChunks;

    #[async_trait]
    impl ChunkRetriever for NoChunks {
        async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedChunk>> {
            Ok(Vec::new())
        }
    }

    struct Echo;

    #[async_trait]
    impl LanguageModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    #[test]
    fn test_builder_requires_a_retriever() {
        let err = RagEngine::builder()
            .with_language_model(Arc::new(Echo))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_builder_requires_a_model() {
        let err = RagEngine::builder()
            .with_retriever(Arc::new(NoChunks))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_builder_rejects_zero_top_k() {
        let result = RagEngine::builder()
            .with_retriever(Arc::new(NoChunks))
            .with_language_model(Arc::new(Echo))
            .with_query_config(QueryConfig {
                top_k: 0,
                ..QueryConfig::default()
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_timeout_defaults_to_config() {
        let engine = RagEngine::builder()
            .with_retriever(Arc::new(NoChunks))
            .with_language_model(Arc::new(Echo))
            .build()
            .unwrap();
        assert_eq!(engine.timeout, Duration::from_secs(60));
        assert_eq!(engine.config().top_k, 5);
    }
}
