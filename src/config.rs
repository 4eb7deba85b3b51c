use serde::{Deserialize, Serialize};
use stratamem_core::DecayPolicy;
use stratamem_shared::APP_ENV;

/// Engine configuration. Unset optional fields fall back to the
/// environment (`LANCEDB_PATH`, `JINA_API_KEY`) at resolve time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryConfig {
  pub enabled: bool,
  pub episode_batch_size: usize,
  /// Token ceiling for the retrieval injection.
  pub token_budget: usize,
  /// Token ceiling for the global budget manager.
  pub global_token_budget: usize,
  pub db_path: Option<String>,
  pub jina_api_key: Option<String>,
  pub jina_model: String,
  pub max_themes: usize,
  /// Session/owner identity stamped on episodes, profiles, and traces.
  pub agent_id: String,
  pub message_retain_days: f64,
  pub episode_half_life_days: f64,
  pub semantic_half_life_days: f64,
}

impl Default for MemoryConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      episode_batch_size: 5,
      token_budget: 500,
      global_token_budget: 4_000,
      db_path: None,
      jina_api_key: None,
      jina_model: "jina-embeddings-v5-text-small".to_owned(),
      max_themes: 50,
      agent_id: "default".to_owned(),
      message_retain_days: 7.0,
      episode_half_life_days: 30.0,
      semantic_half_life_days: 180.0,
    }
  }
}

impl MemoryConfig {
  /// Fill unset fields from the environment.
  #[must_use]
  pub fn resolve_env(mut self) -> Self {
    if self.db_path.is_none() {
      self.db_path = APP_ENV.lancedb_path.clone();
    }
    if self.jina_api_key.is_none() {
      self.jina_api_key = APP_ENV.jina_api_key.clone();
    }
    self
  }

  #[must_use]
  pub fn decay_policy(&self) -> DecayPolicy {
    DecayPolicy {
      theme_half_life_days: None,
      semantic_half_life_days: self.semantic_half_life_days,
      episode_half_life_days: self.episode_half_life_days,
      message_retain_days: self.message_retain_days,
    }
  }
}
