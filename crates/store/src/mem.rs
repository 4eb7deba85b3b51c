use std::collections::HashMap;

use serde_json::Value;
use async_trait::async_trait;
use stratamem_shared::{Result, cosine_similarity};
use tokio::sync::RwLock;

use crate::port::{Filter, Row, Scored, Table, VectorStore};

/// In-memory reference implementation of the vector-store port.
///
/// The shipped default for hosts that do not wire a real vector database,
/// and the test double. Last write wins on equal ids; deletes are
/// idempotent; `update` of a missing row is a no-op.
#[derive(Default)]
pub struct MemStore {
  tables: RwLock<HashMap<Table, HashMap<String, Row>>>,
}

impl MemStore {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl VectorStore for MemStore {
  async fn add(&self, table: Table, row: Row) -> Result<()> {
    let mut tables = self.tables.write().await;
    tables.entry(table).or_default().insert(row.id.clone(), row);
    Ok(())
  }

  async fn get(&self, table: Table, id: &str) -> Result<Option<Row>> {
    let tables = self.tables.read().await;
    Ok(tables.get(&table).and_then(|t| t.get(id)).cloned())
  }

  async fn search(&self, table: Table, vector: &[f32], limit: usize) -> Result<Vec<Scored>> {
    let tables = self.tables.read().await;
    let Some(rows) = tables.get(&table) else {
      return Ok(Vec::new());
    };

    let mut scored: Vec<Scored> = rows
      .values()
      .map(|row| Scored {
        score: cosine_similarity(vector, &row.vector),
        row: row.clone(),
      })
      .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    Ok(scored)
  }

  async fn filter(&self, table: Table, filter: &Filter) -> Result<Vec<Row>> {
    let tables = self.tables.read().await;
    let Some(rows) = tables.get(&table) else {
      return Ok(Vec::new());
    };

    Ok(
      rows
        .values()
        .filter(|row| row.payload.get(&filter.field) == Some(&filter.equals))
        .cloned()
        .collect(),
    )
  }

  async fn update(&self, table: Table, id: &str, patch: Value) -> Result<()> {
    let mut tables = self.tables.write().await;
    let Some(row) = tables.get_mut(&table).and_then(|t| t.get_mut(id)) else {
      return Ok(());
    };

    if let (Some(existing), Some(incoming)) = (row.payload.as_object_mut(), patch.as_object()) {
      for (k, v) in incoming {
        existing.insert(k.clone(), v.clone());
      }
    }
    Ok(())
  }

  async fn delete(&self, table: Table, id: &str) -> Result<()> {
    let mut tables = self.tables.write().await;
    if let Some(rows) = tables.get_mut(&table) {
      rows.remove(id);
    }
    Ok(())
  }

  async fn count(&self, table: Table) -> Result<usize> {
    let tables = self.tables.read().await;
    Ok(tables.get(&table).map_or(0, HashMap::len))
  }

  async fn scan_all(&self, table: Table) -> Result<Vec<Row>> {
    let tables = self.tables.read().await;
    Ok(
      tables
        .get(&table)
        .map(|rows| rows.values().cloned().collect())
        .unwrap_or_default(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn row(id: &str, vector: Vec<f32>) -> Row {
    Row {
      id: id.to_owned(),
      vector,
      payload: json!({ "kind": "test" }),
    }
  }

  #[tokio::test]
  async fn add_overwrites_equal_ids() {
    let store = MemStore::new();
    store.add(Table::Themes, row("a", vec![1.0, 0.0])).await.unwrap();
    store.add(Table::Themes, row("a", vec![0.0, 1.0])).await.unwrap();

    assert_eq!(store.count(Table::Themes).await.unwrap(), 1);
    let got = store.get(Table::Themes, "a").await.unwrap().unwrap();
    assert_eq!(got.vector, vec![0.0, 1.0]);
  }

  #[tokio::test]
  async fn search_ranks_by_cosine_descending() {
    let store = MemStore::new();
    store.add(Table::Semantics, row("near", vec![1.0, 0.0])).await.unwrap();
    store.add(Table::Semantics, row("far", vec![0.0, 1.0])).await.unwrap();

    let hits = store.search(Table::Semantics, &[1.0, 0.1], 2).await.unwrap();
    assert_eq!(hits[0].row.id, "near");
    assert!(hits[0].score > hits[1].score);
  }

  #[tokio::test]
  async fn delete_is_idempotent_and_update_of_missing_is_noop() {
    let store = MemStore::new();
    store.delete(Table::Episodes, "ghost").await.unwrap();
    store
      .update(Table::Episodes, "ghost", json!({ "x": 1 }))
      .await
      .unwrap();
    assert_eq!(store.count(Table::Episodes).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn filter_matches_payload_equality() {
    let store = MemStore::new();
    let mut a = row("a", vec![0.0]);
    a.payload = json!({ "theme_id": "t1" });
    let mut b = row("b", vec![0.0]);
    b.payload = json!({ "theme_id": "t2" });
    store.add(Table::Semantics, a).await.unwrap();
    store.add(Table::Semantics, b).await.unwrap();

    let hits = store
      .filter(Table::Semantics, &Filter::eq("theme_id", "t1"))
      .await
      .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "a");
  }

  #[tokio::test]
  async fn seed_row_dance_initialises_cleanly() {
    let store = MemStore::new();
    crate::port::init_table(&store, Table::Themes, 4).await.unwrap();
    assert_eq!(store.count(Table::Themes).await.unwrap(), 0);
  }
}
