//! Conversational RAG advisor for baggage and customs regulations
//!
//! Answers "can I bring this item?" questions for a travel route by
//! combining a fixed per-jurisdiction regulation catalog, jurisdiction-
//! filtered vector retrieval, and LLM synthesis.
//!
//! ## Architecture
//!
//! ```text
//! User Message → SlotExtractor → (reprompt) | → CatalogMapper → Retriever → JudgeGenerator
//!                     │                            │                │
//!                     ▼                            ▼                ▼
//!               DialogueState                 closed catalog    pgvector store
//! ```
//!
//! The catalog, vector store and LLM clients are constructed once at process
//! start and shared read-only; each conversation owns its own
//! [`DialogueState`](state::DialogueState), returned updated from every turn
//! for the caller to persist.

// LLM client abstraction
pub mod llm_client;
pub mod openai_client;

// Core pipeline modules
pub mod catalog;
pub mod error;
pub mod extractor;
pub mod judge;
pub mod mapper;
pub mod orchestrator;
pub mod retriever;
pub mod state;

// Vector-store plumbing
pub mod embedder;

// Re-exports for convenience
pub use catalog::Catalog;
pub use error::AdvisorError;
pub use judge::{JudgeGenerator, Verdict};
pub use llm_client::LlmClient;
pub use mapper::{CatalogMapper, MappingResult, MAX_MAPPED};
pub use openai_client::OpenAiClient;
pub use orchestrator::DialogueOrchestrator;
pub use retriever::{PgVectorStore, Retriever, RetrieverConfig, VectorStore};
pub use state::{ChatMessage, DialogueState};
