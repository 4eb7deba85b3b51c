use std::env;
use std::sync::LazyLock;

fn optional_env(key: &str) -> Option<String> {
  env::var(key).ok().filter(|v| !v.is_empty())
}

/// Process-wide environment defaults. Config values take precedence; these
/// fill the gaps when the config is silent.
pub struct AppEnv {
  pub lancedb_path: Option<String>,
  pub jina_api_key: Option<String>,
  pub jina_base_url: String,
  pub jina_model: Option<String>,
  pub openai_base_url: Option<String>,
  pub openai_api_key: Option<String>,
  pub openai_chat_model: Option<String>,
}

impl AppEnv {
  fn new() -> Self {
    dotenvy::dotenv().ok();

    Self {
      lancedb_path: optional_env("LANCEDB_PATH"),
      jina_api_key: optional_env("JINA_API_KEY"),
      jina_base_url: optional_env("JINA_BASE_URL")
        .unwrap_or_else(|| "https://api.jina.ai/v1".to_owned()),
      jina_model: optional_env("JINA_MODEL"),
      openai_base_url: optional_env("OPENAI_BASE_URL"),
      openai_api_key: optional_env("OPENAI_API_KEY"),
      openai_chat_model: optional_env("OPENAI_CHAT_MODEL"),
    }
  }
}

pub static APP_ENV: LazyLock<AppEnv> = LazyLock::new(AppEnv::new);
