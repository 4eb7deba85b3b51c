use async_trait::async_trait;
use serde_json::Value;
use stratamem_shared::Result;

/// Persistent tables the engine owns. Any host tables sharing the store are
/// left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Table {
  Themes,
  Semantics,
  Episodes,
  UserProfile,
}

impl Table {
  pub const ALL: [Table; 4] = [
    Table::Themes,
    Table::Semantics,
    Table::Episodes,
    Table::UserProfile,
  ];
}

/// A row at the store boundary: id, search vector, and a flat JSON payload.
/// List-valued columns are serialised as opaque strings inside the payload.
#[derive(Debug, Clone)]
pub struct Row {
  pub id: String,
  pub vector: Vec<f32>,
  pub payload: Value,
}

impl Row {
  pub fn field_str(&self, name: &str) -> Option<&str> {
    self.payload.get(name).and_then(Value::as_str)
  }

  pub fn field_i64(&self, name: &str) -> Option<i64> {
    self.payload.get(name).and_then(Value::as_i64)
  }
}

/// A vector-search hit with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct Scored {
  pub row: Row,
  pub score: f32,
}

/// Equality predicate for filter scans.
#[derive(Debug, Clone)]
pub struct Filter {
  pub field: String,
  pub equals: Value,
}

impl Filter {
  pub fn eq(field: impl Into<String>, equals: impl Into<Value>) -> Self {
    Self {
      field: field.into(),
      equals: equals.into(),
    }
  }
}

/// Typed port over the underlying vector database.
///
/// Contract: `add` upserts (last write wins on equal ids), `delete` is
/// idempotent, `update` of a missing row is a no-op, and the store is safe
/// under concurrent use from parallel sessions.
#[async_trait]
pub trait VectorStore: Send + Sync {
  async fn add(&self, table: Table, row: Row) -> Result<()>;

  async fn get(&self, table: Table, id: &str) -> Result<Option<Row>>;

  /// Top-`limit` rows by cosine similarity to `vector`, descending.
  async fn search(&self, table: Table, vector: &[f32], limit: usize) -> Result<Vec<Scored>>;

  /// Equality-filter scan over the payload.
  async fn filter(&self, table: Table, filter: &Filter) -> Result<Vec<Row>>;

  /// Merge `patch`'s fields into an existing row's payload.
  async fn update(&self, table: Table, id: &str, patch: Value) -> Result<()>;

  async fn delete(&self, table: Table, id: &str) -> Result<()>;

  async fn count(&self, table: Table) -> Result<usize>;

  /// Every row in the table. Maintenance sweeps must see all rows, not a
  /// zero-vector search proxy bounded by a result limit.
  async fn scan_all(&self, table: Table) -> Result<Vec<Row>>;
}

/// First-use table initialisation: some vector databases cannot create an
/// empty table, so seed with a zero-vector row and delete it immediately.
pub async fn init_table(store: &dyn VectorStore, table: Table, dim: usize) -> Result<()> {
  let seed = Row {
    id: format!("__seed_{table}"),
    vector: vec![0.0; dim],
    payload: serde_json::json!({}),
  };
  store.add(table, seed).await?;
  store.delete(table, &format!("__seed_{table}")).await?;
  Ok(())
}
