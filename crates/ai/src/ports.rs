use async_trait::async_trait;
use serde_json::Value;
use stratamem_shared::Result;

/// Fixed embedding dimensionality across the engine.
pub const VECTOR_DIM: usize = 1024;

/// Instruction appended when a backend has no native structured output and
/// the schema rides in the prompt instead.
pub(crate) const SCHEMA_REPLY_INSTRUCTION: &str =
  "Reply with exactly one JSON object matching this schema, no prose:";

/// Task hint passed to task-aware embedding models. Retrieval queries and
/// stored passages are embedded asymmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
  Query,
  TextMatching,
}

/// Opaque vector producer. The one property the engine relies on is that
/// cosine similarity over its output is meaningful.
#[async_trait]
pub trait Embedder: Send + Sync {
  async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>>;

  async fn embed_batch(&self, texts: &[String], task: EmbedTask) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for text in texts {
      out.push(self.embed(text, task).await?);
    }
    Ok(out)
  }
}

/// Cheap text-to-text function used for summarisation, fact extraction,
/// theme naming, and Stage-II sufficiency checks.
#[async_trait]
pub trait TextModel: Send + Sync {
  async fn complete(&self, system: &str, user: &str) -> Result<String>;

  /// Complete constrained to a JSON schema.
  ///
  /// The default embeds the schema in the system prompt, for backends
  /// without native structured output. Implementations backed by an
  /// OpenAI-compatible API override this with strict-mode
  /// `response_format` so the model is constrained by the API itself.
  async fn complete_schema(
    &self,
    system: &str,
    user: &str,
    _schema_name: &str,
    schema: Value,
  ) -> Result<String> {
    let system = format!("{system}\n\n{SCHEMA_REPLY_INSTRUCTION}\n{schema}");
    self.complete(&system, user).await
  }
}
