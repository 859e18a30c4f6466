//! # Lore RAG
//!
//! Retrieval-augmented question answering over an indexed wiki:
//!
//! - **Retrieval**: embed the question, fetch the most similar chunks
//! - **Context**: format the chunks and recent turns into prompt blocks
//! - **Generation**: one grounded language model call per question
//! - **Conversation**: multi-turn history owned by the caller
//! - **Indexing**: embed chunk records and load them into the index
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          RagEngine::ask                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  question ──► ChunkRetriever ──► RetrievedChunk[]               │
//! │                   │                    │                        │
//! │          EmbeddingProvider +           ▼                        │
//! │             CorpusIndex        format_evidence ─┐               │
//! │                                                 ▼               │
//! │  ConversationHistory ──► format_history ──► AnswerGenerator     │
//! │          ▲                                      │               │
//! │          └────────────── append turn ◄──────────┘               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lore_rag::{ConversationHistory, RagConfig, RagEngine};
//!
//! let engine = RagEngine::from_config(&RagConfig::default()).await?;
//! let mut history = ConversationHistory::new();
//!
//! let response = engine.ask("Who is Radahn?", &mut history).await?;
//! println!("{}", response.answer);
//!
//! let follow_up = engine.ask("Who defeated him?", &mut history).await?;
//! ```

pub mod config;
pub mod context;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod generator;
pub mod indexer;
pub mod llm;
pub mod providers;
pub mod retriever;

pub use config::{
    ChunkingConfig, EmbeddingConfig, EmbeddingProviderType, GenerationConfig, IndexConfig,
    IndexProviderType, IndexingConfig, QueryConfig, RagConfig,
};
pub use context::{NO_HISTORY, format_evidence, format_history};
pub use conversation::{ConversationHistory, ConversationTurn};
pub use engine::{AskResponse, AskState, RagEngine, RagEngineBuilder};
pub use error::{RagError, Result};
pub use generator::{AnswerGenerator, FALLBACK_ANSWER};
pub use indexer::{CorpusIndexer, IndexReport};
pub use llm::{GeminiClient, LanguageModel};
pub use retriever::{ChunkPayload, ChunkRetriever, EmbeddingRetriever, RetrievedChunk};

// Re-export commonly used types from dependencies
pub use lore_corpus::{Chunk, ChunkMetadata};
pub use lore_embeddings::{CorpusIndex, EmbeddingProvider};
