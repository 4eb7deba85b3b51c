use std::time::Duration;

use anyhow::anyhow;
use async_openai::{
  Client,
  config::OpenAIConfig,
  error::OpenAIError,
  types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
  },
};
use async_trait::async_trait;
use stratamem_shared::{MemoryError, Result};

use crate::ports::{SCHEMA_REPLY_INSTRUCTION, TextModel};
use crate::structured::fix_schema_for_strict;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Chat-completion client against any OpenAI-compatible endpoint.
pub struct OpenAiTextModel {
  client: Client<OpenAIConfig>,
  model: String,
  timeout: Duration,
}

impl OpenAiTextModel {
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

  fn messages(system: &str, user: &str) -> Vec<ChatCompletionRequestMessage> {
    vec![
      ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(system)),
      ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(user)),
    ]
  }

  async fn send(&self, request: CreateChatCompletionRequest) -> Result<String> {
    let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
      .await
      .map_err(|_| MemoryError::transient(anyhow!("chat request timed out")))?
      .map_err(MemoryError::transient)?;

    response
      .choices
      .into_iter()
      .filter_map(|c| c.message.content)
      .next_back()
      .ok_or_else(|| MemoryError::transient(anyhow!("empty message content")))
  }
}

#[async_trait]
impl TextModel for OpenAiTextModel {
  async fn complete(&self, system: &str, user: &str) -> Result<String> {
    let request = CreateChatCompletionRequestArgs::default()
      .model(&self.model)
      .messages(Self::messages(system, user))
      .build()
      .map_err(|e| MemoryError::Other(e.into()))?;

    self.send(request).await
  }

  /// Strict-mode structured output: the schema constrains the model through
  /// the API's `response_format`. A backend that rejects the field gets the
  /// schema-in-prompt rendition instead; transport failures stay transient.
  async fn complete_schema(
    &self,
    system: &str,
    user: &str,
    schema_name: &str,
    schema: serde_json::Value,
  ) -> Result<String> {
    let mut strict_schema = schema.clone();
    fix_schema_for_strict(&mut strict_schema);

    let request = CreateChatCompletionRequestArgs::default()
      .model(&self.model)
      .messages(Self::messages(system, user))
      .response_format(ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
          description: None,
          name: schema_name.to_owned(),
          schema: Some(strict_schema),
          strict: Some(true),
        },
      })
      .build()
      .map_err(|e| MemoryError::Other(e.into()))?;

    let attempt = tokio::time::timeout(self.timeout, self.client.chat().create(request))
      .await
      .map_err(|_| MemoryError::transient(anyhow!("chat request timed out")))?;

    match attempt {
      Ok(response) => response
        .choices
        .into_iter()
        .filter_map(|c| c.message.content)
        .next_back()
        .ok_or_else(|| MemoryError::transient(anyhow!("empty message content"))),
      Err(OpenAIError::ApiError(api))
        if api.r#type.as_deref() == Some("invalid_request_error") =>
      {
        tracing::debug!(
          error = %api.message,
          "backend rejected structured response_format, using schema-in-prompt"
        );
        let system = format!("{system}\n\n{SCHEMA_REPLY_INSTRUCTION}\n{schema}");
        self.complete(&system, user).await
      }
      Err(err) => Err(MemoryError::transient(err)),
    }
  }
}
