use std::time::Duration;

use anyhow::anyhow;
use async_openai::{Client, config::OpenAIConfig, types::embeddings::CreateEmbeddingRequestArgs};
use async_trait::async_trait;
use stratamem_shared::{MemoryError, Result};

use crate::ports::{EmbedTask, Embedder, VECTOR_DIM};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Embedding client for the Jina embeddings API (OpenAI-compatible surface).
///
/// Every call carries its own deadline; timeouts surface as the same
/// transient error class as a 5xx.
pub struct JinaEmbedder {
  client: Client<OpenAIConfig>,
  model: String,
  timeout: Duration,
}

impl JinaEmbedder {
  pub fn new(api_key: &str, base_url: &str, model: impl Into<String>) -> Self {
    let config = OpenAIConfig::new()
      .with_api_key(api_key)
      .with_api_base(base_url);

    Self {
      client: Client::with_config(config),
      model: model.into(),
      timeout: DEFAULT_TIMEOUT,
    }
  }

  #[must_use]
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  async fn request(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let expected = inputs.len();
    let request = CreateEmbeddingRequestArgs::default()
      .model(&self.model)
      .input(inputs)
      .dimensions(VECTOR_DIM as u32)
      .build()
      .map_err(|e| MemoryError::Other(e.into()))?;

    let response = tokio::time::timeout(self.timeout, self.client.embeddings().create(request))
      .await
      .map_err(|_| MemoryError::transient(anyhow!("embedding request timed out")))?
      .map_err(MemoryError::transient)?;

    let mut vectors: Vec<Vec<f32>> = response.data.into_iter().map(|e| e.embedding).collect();
    if vectors.len() != expected {
      return Err(MemoryError::transient(anyhow!(
        "embedding response returned {} vectors for {} inputs",
        vectors.len(),
        expected
      )));
    }
    for v in &mut vectors {
      if v.len() != VECTOR_DIM {
        return Err(MemoryError::transient(anyhow!(
          "embedding dimension {} != {VECTOR_DIM}",
          v.len()
        )));
      }
    }
    Ok(vectors)
  }
}

#[async_trait]
impl Embedder for JinaEmbedder {
  async fn embed(&self, text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
    let mut vectors = self.request(vec![text.to_owned()]).await?;
    vectors
      .pop()
      .ok_or_else(|| MemoryError::transient(anyhow!("empty embedding response")))
  }

  async fn embed_batch(&self, texts: &[String], _task: EmbedTask) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }
    self.request(texts.to_vec()).await
  }
}
