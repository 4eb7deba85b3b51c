//! Hierarchical conversational-memory engine.
//!
//! Sits between a chat agent and its model: before each call it injects a
//! relevance-ranked, token-budgeted bundle of prior context; after each
//! call it distils the exchange into a self-organising hierarchy of
//! episodes, facts, and themes.

mod config;
pub use config::MemoryConfig;

mod engine;
pub use engine::{MemoryEngine, PromptInjection};

pub use stratamem_ai::{EmbedTask, Embedder, JinaEmbedder, OpenAiTextModel, TextModel};
pub use stratamem_core::{
  BudgetTier, CompactionStrategy, HostTools, MemoryDecision, ObservabilityReport,
  StageTwoDecision, UncertaintyLevel,
};
pub use stratamem_shared::{MemoryError, Message, MessageRole, Result};
pub use stratamem_store::{MemStore, Table, VectorStore};
