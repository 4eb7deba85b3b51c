use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use stratamem_ai::{EmbedTask, Embedder, TextModel};
use stratamem_shared::Result;
use stratamem_store::{EpisodeRecord, SemanticRecord, Table, VectorStore, new_id};

/// Cosine-distance floor below which a candidate fact duplicates an
/// existing neighbour and is dropped.
pub const DEDUPE_THRESHOLD: f32 = 0.15;

const MAX_FACTS_PER_EPISODE: usize = 3;
const FACT_CHAR_LIMIT: usize = 200;
const MIN_FACT_CHARS: usize = 5;
const NEIGHBOR_PROBE_LIMIT: usize = 5;

const EXTRACTION_SYSTEM_PROMPT: &str = "\
Extract 1-3 short reusable facts from the episode summary below. Each fact \
must stand on its own outside this conversation. No greetings, no process \
chatter, no meta commentary. One fact per line, no bullets or numbering. \
Write in the language of the input.";

static LIST_MARKER: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]\s*|\d+[.)]\s+)?").expect("list marker compiles"));

/// Strip list markers the model tends to prepend despite instructions.
/// Facts that genuinely start with a number ("3.12 is the default") keep it.
fn clean_line(line: &str) -> &str {
  let trimmed = line.trim();
  match LIST_MARKER.find(trimmed) {
    Some(m) => trimmed[m.end()..].trim(),
    None => trimmed,
  }
}

/// Distil an episode summary into deduplicated semantic facts.
///
/// Returned records have no theme assignment yet; the theme manager fills
/// `theme_id` and persists them.
pub async fn extract_facts(
  episode: &EpisodeRecord,
  model: &dyn TextModel,
  embedder: &dyn Embedder,
  store: &dyn VectorStore,
) -> Result<Vec<SemanticRecord>> {
  let reply = model.complete(EXTRACTION_SYSTEM_PROMPT, &episode.summary).await?;

  let candidates: Vec<String> = reply
    .lines()
    .map(clean_line)
    .filter(|l| l.chars().count() >= MIN_FACT_CHARS)
    .take(MAX_FACTS_PER_EPISODE)
    .map(|l| l.chars().take(FACT_CHAR_LIMIT).collect())
    .collect();

  if candidates.is_empty() {
    return Ok(Vec::new());
  }

  let embeddings = embedder.embed_batch(&candidates, EmbedTask::TextMatching).await?;

  let now = Utc::now().timestamp_millis();
  let mut facts = Vec::new();
  for (content, embedding) in candidates.into_iter().zip(embeddings) {
    let neighbours = store
      .search(Table::Semantics, &embedding, NEIGHBOR_PROBE_LIMIT)
      .await?;
    let duplicate = neighbours.iter().any(|hit| 1.0 - hit.score < DEDUPE_THRESHOLD);
    if duplicate {
      tracing::debug!(fact = %content, "dropping duplicate fact candidate");
      continue;
    }

    facts.push(SemanticRecord {
      id: new_id(),
      content,
      embedding,
      theme_id: String::new(),
      episode_ids: vec![episode.id.clone()],
      neighbor_ids: Vec::new(),
      created_at: now,
      updated_at: now,
    });
  }

  Ok(facts)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clean_line_strips_bullets_and_numbering() {
    assert_eq!(clean_line("- User prefers tabs"), "User prefers tabs");
    assert_eq!(clean_line("2. Project uses tokio"), "Project uses tokio");
    assert_eq!(clean_line("  * 数据库是 Postgres  "), "数据库是 Postgres");
  }

  #[test]
  fn clean_line_keeps_plain_text() {
    assert_eq!(clean_line("TypeScript strict mode enabled"), "TypeScript strict mode enabled");
  }

  #[test]
  fn clean_line_keeps_leading_version_numbers() {
    assert_eq!(clean_line("3.12 is the default Python"), "3.12 is the default Python");
  }
}
