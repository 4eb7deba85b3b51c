use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageRole {
  User,
  Assistant,
  Tool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
  pub role: MessageRole,
  pub content: String,
  pub timestamp: DateTime<Utc>,
}

impl Message {
  pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
    Self {
      role,
      content: content.into(),
      timestamp: Utc::now(),
    }
  }

  pub fn at(role: MessageRole, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
    Self {
      role,
      content: content.into(),
      timestamp,
    }
  }

  #[must_use]
  pub fn is_user(&self) -> bool {
    matches!(self.role, MessageRole::User)
  }

  #[must_use]
  pub fn is_assistant(&self) -> bool {
    matches!(self.role, MessageRole::Assistant)
  }
}
