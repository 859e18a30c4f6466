//! Grounded answer generation.

use std::sync::Arc;

use tracing::debug;

use crate::error::{RagError, Result};
use crate::llm::LanguageModel;

/// Answer recorded when retrieval finds nothing to ground an answer on.
pub const FALLBACK_ANSWER: &str =
    "I couldn't find any relevant information in the wiki for this question.";

const DEFAULT_SUBJECT: &str = "the wiki's subject";

/// Builds the answer prompt and asks the language model once.
pub struct AnswerGenerator {
    model: Arc<dyn LanguageModel>,
    subject: String,
}

impl AnswerGenerator {
    /// Create a generator using the given model.
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }

    /// Set what the assistant claims expertise in, e.g. `"Elden Ring lore"`.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Render the prompt for one question.
    pub fn build_prompt(&self, question: &str, evidence: &str, history: &str) -> String {
        format!(
            "You are an expert on {subject}. Use the conversation so far and the \
following context from the wiki to answer the user's question accurately and helpfully.

Conversation so far:
{history}

Context from the wiki:
{evidence}

Question: {question}

Instructions:
- Answer based primarily on the provided context
- Be accurate and detailed but concise
- If the context doesn't contain enough information, say so clearly
- Include relevant quotes from the context when helpful
- Use the conversation so far to resolve follow-up references such as \"he\", \"she\" or \"it\"
- Stay on topic and politely decline questions unrelated to {subject}

Answer:",
            subject = self.subject,
        )
    }

    /// Generate an answer from pre-formatted evidence and history blocks.
    ///
    /// Makes exactly one model call. The completion is trimmed, and an empty
    /// completion is an error.
    pub async fn generate(&self, question: &str, evidence: &str, history: &str) -> Result<String> {
        let prompt = self.build_prompt(question, evidence, history);
        debug!("Prompting {} with {} characters", self.model.name(), prompt.len());

        let answer = self.model.complete(&prompt).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(RagError::Generation(
                "language model returned an empty answer".to_string(),
            ));
        }
        Ok(answer.to_string())
    }
}
