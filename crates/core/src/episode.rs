use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use stratamem_ai::{EmbedTask, Embedder, TextModel};
use stratamem_shared::{Message, Result};
use stratamem_store::{EpisodeRecord, RawMessage, VectorStore, new_id};

/// Per-message body cap inside the raw-message blob.
const RAW_MESSAGE_CHAR_LIMIT: usize = 500;

const SUMMARY_SYSTEM_PROMPT: &str = "\
Summarize the conversation below in 50-100 tokens. Capture what was \
discussed, the key decisions, and any planned actions. Write in the \
language of the input. Output only the summary.";

static TOPIC_SWITCH: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"(?i)(by the way|another question|on another note|speaking of which|changing (the )?topic|unrelated question|另外|换个话题|换一个话题|对了|顺便问|说到这)",
  )
  .expect("topic switch pattern compiles")
});

/// True when the incoming message carries an explicit topic-switch marker.
/// Plain continuations never match.
pub fn is_topic_switch(incoming: &str) -> bool {
  TOPIC_SWITCH.is_match(incoming)
}

/// Buffers raw messages for one session and emits coherent episode records.
///
/// The buffer is bounded at `batch_size`; topic-switch-triggered mid-batch
/// flushes keep it from growing past that. Failed flushes leave the buffer
/// untouched so the next turn retries.
pub struct EpisodeBuilder {
  session_id: String,
  batch_size: usize,
  buffer: Vec<Message>,
  /// A topic-switching message parked until the pre-switch batch flushes.
  carry: Option<Message>,
  turn_cursor: u32,
}

impl EpisodeBuilder {
  pub fn new(session_id: impl Into<String>, batch_size: usize) -> Self {
    Self {
      session_id: session_id.into(),
      batch_size: batch_size.max(1),
      buffer: Vec::new(),
      carry: None,
      turn_cursor: 0,
    }
  }

  #[must_use]
  pub fn buffered(&self) -> usize {
    self.buffer.len()
  }

  /// Append a message. Returns true when a batch is ready to flush, either
  /// because the buffer reached `batch_size` or because the incoming
  /// message switches topic; in the latter case the message is parked and
  /// joins the next buffer after the flush.
  pub fn add(&mut self, message: Message) -> bool {
    if !self.buffer.is_empty() && is_topic_switch(&message.content) {
      self.carry = Some(message);
      return true;
    }

    self.buffer.push(message);
    self.buffer.len() >= self.batch_size
  }

  /// Summarise the buffered batch, embed the summary, and persist the
  /// episode. Returns `None` on an empty buffer. Any summariser or
  /// embedding error propagates and no partial episode is persisted.
  pub async fn flush(
    &mut self,
    model: &dyn TextModel,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
  ) -> Result<Option<EpisodeRecord>> {
    if self.buffer.is_empty() {
      if let Some(carried) = self.carry.take() {
        self.buffer.push(carried);
      }
      return Ok(None);
    }

    let transcript: String = self
      .buffer
      .iter()
      .map(|m| format!("{}: {}\n", m.role, m.content))
      .collect();

    let summary = model.complete(SUMMARY_SYSTEM_PROMPT, &transcript).await?;
    let summary = summary.trim().to_owned();
    if summary.is_empty() {
      tracing::warn!(session_id = %self.session_id, "skipping episode: empty summary");
      self.reset_buffer();
      return Ok(None);
    }

    let embedding = embedder.embed(&summary, EmbedTask::TextMatching).await?;

    let raw: Vec<RawMessage> = self
      .buffer
      .iter()
      .map(|m| RawMessage {
        role: m.role.to_string(),
        content: m.content.chars().take(RAW_MESSAGE_CHAR_LIMIT).collect(),
        timestamp: m.timestamp.timestamp_millis(),
      })
      .collect();

    let count = self.buffer.len() as u32;
    let episode = EpisodeRecord {
      id: new_id(),
      summary,
      turn_start: self.turn_cursor,
      turn_end: self.turn_cursor + count - 1,
      message_count: count,
      session_id: self.session_id.clone(),
      created_at: Utc::now().timestamp_millis(),
      embedding,
      raw_messages: serde_json::to_string(&raw)?,
    };

    episode.save(store).await?;

    tracing::info!(
      episode_id = %episode.id,
      session_id = %self.session_id,
      messages = count,
      "episode created"
    );

    self.turn_cursor += count;
    self.reset_buffer();
    Ok(Some(episode))
  }

  fn reset_buffer(&mut self) {
    self.buffer.clear();
    if let Some(carried) = self.carry.take() {
      self.buffer.push(carried);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use stratamem_shared::MessageRole;

  #[test]
  fn detects_explicit_markers_case_insensitive() {
    assert!(is_topic_switch("By the way, how do I deploy this?"));
    assert!(is_topic_switch("另外，数据库怎么配置？"));
    assert!(is_topic_switch("换个话题，今天天气如何"));
  }

  #[test]
  fn no_false_positive_on_continuation() {
    assert!(!is_topic_switch("and then we should add a retry"));
    assert!(!is_topic_switch("那这个参数是什么意思"));
  }

  #[test]
  fn batch_ready_at_batch_size() {
    let mut builder = EpisodeBuilder::new("s1", 3);
    assert!(!builder.add(Message::new(MessageRole::User, "first message")));
    assert!(!builder.add(Message::new(MessageRole::Assistant, "second message")));
    assert!(builder.add(Message::new(MessageRole::User, "third message")));
  }

  #[test]
  fn topic_switch_parks_switching_message() {
    let mut builder = EpisodeBuilder::new("s1", 5);
    builder.add(Message::new(MessageRole::User, "tell me about rust"));
    assert!(builder.add(Message::new(
      MessageRole::User,
      "by the way, what about python?"
    )));
    // The switching message is not part of the current batch.
    assert_eq!(builder.buffered(), 1);
  }

  #[test]
  fn switch_on_empty_buffer_is_a_plain_add() {
    let mut builder = EpisodeBuilder::new("s1", 5);
    assert!(!builder.add(Message::new(MessageRole::User, "by the way, hello")));
    assert_eq!(builder.buffered(), 1);
  }
}
