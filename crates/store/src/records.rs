use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stratamem_shared::{MemoryError, Result};
use uuid::Uuid;

use crate::port::{Filter, Row, Table, VectorStore};

/// Collision-resistant opaque id, time-ordered for stable pagination.
pub fn new_id() -> String {
  Uuid::now_v7().to_string()
}

fn ids_to_column(ids: &[String]) -> Result<String> {
  Ok(serde_json::to_string(ids)?)
}

fn ids_from_column(row: &Row, name: &str) -> Result<Vec<String>> {
  match row.field_str(name) {
    Some(raw) => Ok(serde_json::from_str(raw)?),
    None => Ok(Vec::new()),
  }
}

fn required_str(row: &Row, name: &str) -> Result<String> {
  row
    .field_str(name)
    .map(ToOwned::to_owned)
    .ok_or_else(|| MemoryError::Other(anyhow!("row {} missing column {name}", row.id)))
}

// ──────────────────────────────────────────────────
// Theme
// ──────────────────────────────────────────────────

/// Top tier of the hierarchy: a cluster of related facts with a topic label.
/// Neighbour links are ids, never owning references; lookup goes through the
/// theme table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeRecord {
  pub id: String,
  pub name: String,
  pub summary: String,
  /// Approximate centroid of the member semantics' embeddings.
  pub embedding: Vec<f32>,
  /// Ordered member list; the inverse of each semantic's `theme_id`.
  pub semantic_ids: Vec<String>,
  pub message_count: u32,
  pub last_active: i64,
  pub neighbor_ids: Vec<String>,
  /// Set by the weekly sweep after 30 days without activity. Dormant themes
  /// are never deleted.
  pub dormant: bool,
  pub created_at: i64,
}

impl ThemeRecord {
  pub fn to_row(&self) -> Result<Row> {
    Ok(Row {
      id: self.id.clone(),
      vector: self.embedding.clone(),
      payload: json!({
        "name": self.name,
        "summary": self.summary,
        "semantic_ids": ids_to_column(&self.semantic_ids)?,
        "message_count": self.message_count,
        "last_active": self.last_active,
        "neighbor_ids": ids_to_column(&self.neighbor_ids)?,
        "dormant": self.dormant,
        "created_at": self.created_at,
      }),
    })
  }

  pub fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id: row.id.clone(),
      name: required_str(row, "name")?,
      summary: row.field_str("summary").unwrap_or_default().to_owned(),
      embedding: row.vector.clone(),
      semantic_ids: ids_from_column(row, "semantic_ids")?,
      message_count: row.field_i64("message_count").unwrap_or(0) as u32,
      last_active: row.field_i64("last_active").unwrap_or(0),
      neighbor_ids: ids_from_column(row, "neighbor_ids")?,
      dormant: row
        .payload
        .get("dormant")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false),
      created_at: row.field_i64("created_at").unwrap_or(0),
    })
  }

  pub async fn save(&self, store: &dyn VectorStore) -> Result<()> {
    store.add(Table::Themes, self.to_row()?).await
  }

  pub async fn find(store: &dyn VectorStore, id: &str) -> Result<Option<Self>> {
    match store.get(Table::Themes, id).await? {
      Some(row) => Ok(Some(Self::from_row(&row)?)),
      None => Ok(None),
    }
  }

  pub async fn load_all(store: &dyn VectorStore) -> Result<Vec<Self>> {
    let rows = store.scan_all(Table::Themes).await?;
    rows.iter().map(Self::from_row).collect()
  }

  pub async fn search(
    store: &dyn VectorStore,
    vector: &[f32],
    limit: usize,
  ) -> Result<Vec<(Self, f32)>> {
    let hits = store.search(Table::Themes, vector, limit).await?;
    hits
      .iter()
      .map(|s| Ok((Self::from_row(&s.row)?, s.score)))
      .collect()
  }
}

// ──────────────────────────────────────────────────
// Semantic
// ──────────────────────────────────────────────────

/// A short reusable fact distilled from one or more episodes. Belongs to
/// exactly one theme; episode back-pointers may dangle after decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticRecord {
  pub id: String,
  pub content: String,
  pub embedding: Vec<f32>,
  pub theme_id: String,
  pub episode_ids: Vec<String>,
  pub neighbor_ids: Vec<String>,
  pub created_at: i64,
  pub updated_at: i64,
}

impl SemanticRecord {
  pub fn to_row(&self) -> Result<Row> {
    Ok(Row {
      id: self.id.clone(),
      vector: self.embedding.clone(),
      payload: json!({
        "content": self.content,
        "theme_id": self.theme_id,
        "episode_ids": ids_to_column(&self.episode_ids)?,
        "neighbor_ids": ids_to_column(&self.neighbor_ids)?,
        "created_at": self.created_at,
        "updated_at": self.updated_at,
      }),
    })
  }

  pub fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id: row.id.clone(),
      content: required_str(row, "content")?,
      embedding: row.vector.clone(),
      theme_id: required_str(row, "theme_id")?,
      episode_ids: ids_from_column(row, "episode_ids")?,
      neighbor_ids: ids_from_column(row, "neighbor_ids")?,
      created_at: row.field_i64("created_at").unwrap_or(0),
      updated_at: row.field_i64("updated_at").unwrap_or(0),
    })
  }

  pub async fn save(&self, store: &dyn VectorStore) -> Result<()> {
    store.add(Table::Semantics, self.to_row()?).await
  }

  pub async fn find(store: &dyn VectorStore, id: &str) -> Result<Option<Self>> {
    match store.get(Table::Semantics, id).await? {
      Some(row) => Ok(Some(Self::from_row(&row)?)),
      None => Ok(None),
    }
  }

  pub async fn search(
    store: &dyn VectorStore,
    vector: &[f32],
    limit: usize,
  ) -> Result<Vec<(Self, f32)>> {
    let hits = store.search(Table::Semantics, vector, limit).await?;
    hits
      .iter()
      .map(|s| Ok((Self::from_row(&s.row)?, s.score)))
      .collect()
  }

  pub async fn in_theme(store: &dyn VectorStore, theme_id: &str) -> Result<Vec<Self>> {
    let rows = store
      .filter(Table::Semantics, &Filter::eq("theme_id", theme_id))
      .await?;
    rows.iter().map(Self::from_row).collect()
  }
}

// ──────────────────────────────────────────────────
// Episode
// ──────────────────────────────────────────────────

/// One raw message retained inside an episode blob, body truncated at
/// capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
  pub role: String,
  pub content: String,
  pub timestamp: i64,
}

/// Summary of a short contiguous message batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeRecord {
  pub id: String,
  pub summary: String,
  pub turn_start: u32,
  pub turn_end: u32,
  pub message_count: u32,
  pub session_id: String,
  pub created_at: i64,
  pub embedding: Vec<f32>,
  /// Serialised `Vec<RawMessage>`; blanked to `[]` after the retain window.
  pub raw_messages: String,
}

impl EpisodeRecord {
  pub fn to_row(&self) -> Result<Row> {
    Ok(Row {
      id: self.id.clone(),
      vector: self.embedding.clone(),
      payload: json!({
        "summary": self.summary,
        "turn_start": self.turn_start,
        "turn_end": self.turn_end,
        "message_count": self.message_count,
        "session_id": self.session_id,
        "created_at": self.created_at,
        "raw_messages": self.raw_messages,
      }),
    })
  }

  pub fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id: row.id.clone(),
      summary: required_str(row, "summary")?,
      turn_start: row.field_i64("turn_start").unwrap_or(0) as u32,
      turn_end: row.field_i64("turn_end").unwrap_or(0) as u32,
      message_count: row.field_i64("message_count").unwrap_or(0) as u32,
      session_id: row.field_str("session_id").unwrap_or_default().to_owned(),
      created_at: row.field_i64("created_at").unwrap_or(0),
      embedding: row.vector.clone(),
      raw_messages: row.field_str("raw_messages").unwrap_or("[]").to_owned(),
    })
  }

  pub async fn save(&self, store: &dyn VectorStore) -> Result<()> {
    store.add(Table::Episodes, self.to_row()?).await
  }

  pub async fn find(store: &dyn VectorStore, id: &str) -> Result<Option<Self>> {
    match store.get(Table::Episodes, id).await? {
      Some(row) => Ok(Some(Self::from_row(&row)?)),
      None => Ok(None),
    }
  }

  pub async fn load_all(store: &dyn VectorStore) -> Result<Vec<Self>> {
    let rows = store.scan_all(Table::Episodes).await?;
    rows.iter().map(Self::from_row).collect()
  }
}

// ──────────────────────────────────────────────────
// User profile
// ──────────────────────────────────────────────────

/// Weekly behavioural/cognitive distillation, one latest row per
/// (user, phase); older phases fold into the global text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfileRecord {
  pub id: String,
  pub user_id: String,
  /// ISO-week phase label, e.g. `2026-W31`.
  pub phase: String,
  pub behavioral: String,
  pub cognitive: String,
  pub global_text: String,
  pub embedding: Vec<f32>,
  pub updated_at: i64,
}

impl UserProfileRecord {
  pub fn to_row(&self) -> Result<Row> {
    Ok(Row {
      id: self.id.clone(),
      vector: self.embedding.clone(),
      payload: json!({
        "user_id": self.user_id,
        "phase": self.phase,
        "behavioral": self.behavioral,
        "cognitive": self.cognitive,
        "global_text": self.global_text,
        "updated_at": self.updated_at,
      }),
    })
  }

  pub fn from_row(row: &Row) -> Result<Self> {
    Ok(Self {
      id: row.id.clone(),
      user_id: required_str(row, "user_id")?,
      phase: row.field_str("phase").unwrap_or_default().to_owned(),
      behavioral: row.field_str("behavioral").unwrap_or_default().to_owned(),
      cognitive: row.field_str("cognitive").unwrap_or_default().to_owned(),
      global_text: row.field_str("global_text").unwrap_or_default().to_owned(),
      embedding: row.vector.clone(),
      updated_at: row.field_i64("updated_at").unwrap_or(0),
    })
  }

  pub async fn save(&self, store: &dyn VectorStore) -> Result<()> {
    store.add(Table::UserProfile, self.to_row()?).await
  }

  pub async fn for_user(store: &dyn VectorStore, user_id: &str) -> Result<Vec<Self>> {
    let rows = store
      .filter(Table::UserProfile, &Filter::eq("user_id", user_id))
      .await?;
    rows.iter().map(Self::from_row).collect()
  }

  /// The most recently updated profile row for a user, if any.
  pub async fn latest(store: &dyn VectorStore, user_id: &str) -> Result<Option<Self>> {
    let mut profiles = Self::for_user(store, user_id).await?;
    profiles.sort_by_key(|p| p.updated_at);
    Ok(profiles.pop())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn theme_round_trips_through_row() {
    let theme = ThemeRecord {
      id: new_id(),
      name: "Rust tooling".to_owned(),
      summary: "Build tooling facts".to_owned(),
      embedding: vec![0.1, 0.2],
      semantic_ids: vec!["a".to_owned(), "b".to_owned()],
      message_count: 4,
      last_active: 1_700_000_000_000,
      neighbor_ids: vec!["n1".to_owned()],
      dormant: false,
      created_at: 1_600_000_000_000,
    };

    let row = theme.to_row().unwrap();
    // List columns cross the boundary as opaque strings.
    assert!(row.payload["semantic_ids"].is_string());

    let back = ThemeRecord::from_row(&row).unwrap();
    assert_eq!(back.semantic_ids, theme.semantic_ids);
    assert_eq!(back.neighbor_ids, theme.neighbor_ids);
    assert_eq!(back.message_count, theme.message_count);
    assert_eq!(back.embedding, theme.embedding);
  }

  #[test]
  fn semantic_round_trips_through_row() {
    let semantic = SemanticRecord {
      id: new_id(),
      content: "User prefers tabs".to_owned(),
      embedding: vec![1.0; 4],
      theme_id: "t1".to_owned(),
      episode_ids: vec!["e1".to_owned(), "e2".to_owned()],
      neighbor_ids: Vec::new(),
      created_at: 10,
      updated_at: 20,
    };

    let back = SemanticRecord::from_row(&semantic.to_row().unwrap()).unwrap();
    assert_eq!(back.content, semantic.content);
    assert_eq!(back.theme_id, semantic.theme_id);
    assert_eq!(back.episode_ids, semantic.episode_ids);
  }

  #[test]
  fn episode_round_trips_through_row() {
    let raw = serde_json::to_string(&vec![RawMessage {
      role: "user".to_owned(),
      content: "hello there".to_owned(),
      timestamp: 5,
    }])
    .unwrap();
    let episode = EpisodeRecord {
      id: new_id(),
      summary: "Greetings exchanged".to_owned(),
      turn_start: 0,
      turn_end: 4,
      message_count: 5,
      session_id: "s1".to_owned(),
      created_at: 99,
      embedding: vec![0.5; 3],
      raw_messages: raw.clone(),
    };

    let back = EpisodeRecord::from_row(&episode.to_row().unwrap()).unwrap();
    assert_eq!(back.raw_messages, raw);
    assert_eq!(back.turn_end, 4);
    assert_eq!(back.session_id, "s1");
  }
}
