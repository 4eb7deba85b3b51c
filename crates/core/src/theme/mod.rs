mod gate;
pub use gate::TailSampler;

use stratamem_ai::TextModel;
use stratamem_shared::{Result, centroid, cosine_similarity};
use stratamem_store::{SemanticRecord, Table, ThemeRecord, VectorStore, new_id};

/// Cosine distance above which a fact opens a new theme instead of joining
/// the closest one.
pub const ASSIGN_DISTANCE_THRESHOLD: f32 = 0.70;

/// Fixed split bound used until the size gate has enough observations.
pub const MAX_SEMANTICS_PER_THEME: usize = 12;

/// Themes below this size are merge candidates.
pub const MIN_SEMANTICS_PER_THEME: usize = 3;

/// Neighbour count in the theme k-NN graph.
pub const KNN_K: usize = 5;

const SPLIT_TAIL_QUANTILE: f32 = 0.90;
const MERGE_TAIL_QUANTILE: f32 = 0.90;
const MERGE_SIM_FALLBACK: f32 = 0.80;
const TWO_MEANS_ITERATIONS: usize = 3;
const THEME_NAME_CHAR_LIMIT: usize = 50;
const GATE_SAMPLE_CAP: usize = 256;
const GATE_MIN_OBSERVATIONS: usize = 10;

const THEME_NAME_SYSTEM_PROMPT: &str = "\
Produce a short topic name (at most 5 words) for a memory theme covering \
the facts below. Output only the name, in the language of the input.";

/// What an assignment did to the hierarchy.
#[derive(Debug, Clone)]
pub struct AssignOutcome {
  pub theme_id: String,
  pub created_theme: bool,
  /// Ids of the two children when the assignment triggered a split.
  pub split_into: Option<(String, String)>,
}

/// How evenly facts are distributed across themes: N² / (K · Σ n_k² + ε).
/// High is balanced, low is one giant theme.
pub fn sparsity_score(themes: &[ThemeRecord]) -> f64 {
  let k = themes.len();
  if k == 0 {
    return 0.0;
  }
  let n: usize = themes.iter().map(|t| t.semantic_ids.len()).sum();
  let sum_sq: f64 = themes
    .iter()
    .map(|t| (t.semantic_ids.len() as f64).powi(2))
    .sum();
  (n as f64).powi(2) / (k as f64 * sum_sq + 1e-9)
}

/// Maintains the top tier of the hierarchy: fact→theme assignment, the
/// distribution-aware split/merge gates, and the theme k-NN graph.
pub struct ThemeManager {
  size_gate: TailSampler,
  similarity_gate: TailSampler,
  max_themes: usize,
}

impl ThemeManager {
  pub fn new(max_themes: usize) -> Self {
    Self {
      size_gate: TailSampler::new(GATE_SAMPLE_CAP, GATE_MIN_OBSERVATIONS),
      similarity_gate: TailSampler::new(GATE_SAMPLE_CAP, GATE_MIN_OBSERVATIONS),
      max_themes: max_themes.max(1),
    }
  }

  /// Split when the theme's size lies in the upper tail of observed sizes,
  /// falling back to the fixed bound while observations are scarce.
  #[must_use]
  pub fn should_split(&self, size: usize) -> bool {
    self
      .size_gate
      .in_upper_tail(size as f32, SPLIT_TAIL_QUANTILE)
      .unwrap_or(size > MAX_SEMANTICS_PER_THEME)
  }

  /// Merge only when both sides are small and unusually close.
  #[must_use]
  pub fn should_merge(&self, size_a: usize, size_b: usize, similarity: f32) -> bool {
    if size_a >= MIN_SEMANTICS_PER_THEME || size_b >= MIN_SEMANTICS_PER_THEME {
      return false;
    }
    self
      .similarity_gate
      .in_upper_tail(similarity, MERGE_TAIL_QUANTILE)
      .unwrap_or(similarity >= MERGE_SIM_FALLBACK)
  }

  /// Place a fact in the closest theme, creating one when nothing is close
  /// enough, then run the split gate on the receiving theme.
  ///
  /// Persists the fact (with its final `theme_id`) and every touched theme.
  pub async fn assign(
    &mut self,
    mut fact: SemanticRecord,
    model: &dyn TextModel,
    store: &dyn VectorStore,
    now_ms: i64,
  ) -> Result<AssignOutcome> {
    let themes = ThemeRecord::load_all(store).await?;

    let best = themes
      .into_iter()
      .map(|t| {
        let sim = cosine_similarity(&fact.embedding, &t.embedding);
        (t, sim)
      })
      .max_by(|a, b| a.1.total_cmp(&b.1));

    let too_far = best
      .as_ref()
      .is_none_or(|(_, sim)| *sim < 1.0 - ASSIGN_DISTANCE_THRESHOLD);
    let theme_count = store.count(Table::Themes).await?;

    if too_far && theme_count < self.max_themes {
      let name = theme_name(model, &fact.content).await?;
      let theme = ThemeRecord {
        id: new_id(),
        name,
        summary: fact.content.clone(),
        embedding: fact.embedding.clone(),
        semantic_ids: vec![fact.id.clone()],
        message_count: 1,
        last_active: now_ms,
        neighbor_ids: Vec::new(),
        dormant: false,
        created_at: now_ms,
      };
      fact.theme_id = theme.id.clone();
      fact.save(store).await?;
      theme.save(store).await?;
      self.size_gate.record(1.0);

      tracing::info!(theme_id = %theme.id, name = %theme.name, "theme created");
      return Ok(AssignOutcome {
        theme_id: theme.id,
        created_theme: true,
        split_into: None,
      });
    }

    // At the theme cap an unmatched fact still lands in the closest theme.
    let (mut theme, _) = best.expect("theme exists when not creating");

    let member_count = theme.semantic_ids.len();
    theme.embedding = blend_centroid(&theme.embedding, &fact.embedding, member_count);
    theme.semantic_ids.push(fact.id.clone());
    theme.message_count += 1;
    theme.last_active = now_ms;
    theme.dormant = false;

    fact.theme_id = theme.id.clone();
    fact.save(store).await?;
    theme.save(store).await?;

    let new_size = theme.semantic_ids.len();
    self.size_gate.record(new_size as f32);

    if self.should_split(new_size) {
      let children = self.split(theme, model, store, now_ms).await?;
      return Ok(AssignOutcome {
        theme_id: children.0.clone(),
        created_theme: false,
        split_into: Some(children),
      });
    }

    Ok(AssignOutcome {
      theme_id: theme.id,
      created_theme: false,
      split_into: None,
    })
  }

  /// Two-means over the theme's fact embeddings, producing two fresh themes
  /// that partition the parent's members. The parent is deleted.
  async fn split(
    &mut self,
    theme: ThemeRecord,
    model: &dyn TextModel,
    store: &dyn VectorStore,
    now_ms: i64,
  ) -> Result<(String, String)> {
    let members = SemanticRecord::in_theme(store, &theme.id).await?;
    let embeddings: Vec<&[f32]> = members.iter().map(|m| m.embedding.as_slice()).collect();
    let (left_idx, right_idx) = two_means(&embeddings, TWO_MEANS_ITERATIONS);

    let half = theme.message_count / 2;
    let left = self
      .build_split_child(&members, &left_idx, half, model, store, now_ms)
      .await?;
    let right = self
      .build_split_child(
        &members,
        &right_idx,
        theme.message_count - half,
        model,
        store,
        now_ms,
      )
      .await?;

    store.delete(Table::Themes, &theme.id).await?;

    tracing::info!(
      parent = %theme.id,
      left = %left,
      right = %right,
      members = members.len(),
      "theme split"
    );
    Ok((left, right))
  }

  async fn build_split_child(
    &mut self,
    members: &[SemanticRecord],
    indices: &[usize],
    message_count: u32,
    model: &dyn TextModel,
    store: &dyn VectorStore,
    now_ms: i64,
  ) -> Result<String> {
    let group: Vec<&SemanticRecord> = indices.iter().map(|&i| &members[i]).collect();
    let vectors: Vec<&[f32]> = group.iter().map(|m| m.embedding.as_slice()).collect();
    let joined: String = group
      .iter()
      .take(5)
      .map(|m| m.content.as_str())
      .collect::<Vec<_>>()
      .join("\n");

    let child = ThemeRecord {
      id: new_id(),
      name: theme_name(model, &joined).await?,
      summary: group.first().map(|m| m.content.clone()).unwrap_or_default(),
      embedding: centroid(&vectors),
      semantic_ids: group.iter().map(|m| m.id.clone()).collect(),
      message_count,
      last_active: now_ms,
      neighbor_ids: Vec::new(),
      dormant: false,
      created_at: now_ms,
    };

    for member in &group {
      store
        .update(
          Table::Semantics,
          &member.id,
          serde_json::json!({ "theme_id": child.id, "updated_at": now_ms }),
        )
        .await?;
    }
    child.save(store).await?;
    self.size_gate.record(child.semantic_ids.len() as f32);
    Ok(child.id)
  }

  /// One pass of k-NN-guided merges over small, unusually close theme
  /// pairs. Returns the number of merges performed.
  pub async fn merge_pass(&mut self, store: &dyn VectorStore, now_ms: i64) -> Result<usize> {
    let themes = ThemeRecord::load_all(store).await?;
    let mut consumed: Vec<String> = Vec::new();
    let mut merges = 0;

    for theme in &themes {
      if consumed.iter().any(|id| id == &theme.id) {
        continue;
      }
      let Some(mut keeper) = ThemeRecord::find(store, &theme.id).await? else {
        continue;
      };

      for neighbor_id in theme.neighbor_ids.clone() {
        if consumed.iter().any(|id| id == &neighbor_id) || neighbor_id == keeper.id {
          continue;
        }
        let Some(other) = ThemeRecord::find(store, &neighbor_id).await? else {
          continue;
        };

        let sim = cosine_similarity(&keeper.embedding, &other.embedding);
        self.similarity_gate.record(sim);

        if !self.should_merge(keeper.semantic_ids.len(), other.semantic_ids.len(), sim) {
          continue;
        }

        for semantic_id in &other.semantic_ids {
          store
            .update(
              Table::Semantics,
              semantic_id,
              serde_json::json!({ "theme_id": keeper.id, "updated_at": now_ms }),
            )
            .await?;
        }
        keeper.semantic_ids.extend(other.semantic_ids.iter().cloned());
        keeper.message_count += other.message_count;
        keeper.last_active = keeper.last_active.max(other.last_active);
        keeper.save(store).await?;
        store.delete(Table::Themes, &other.id).await?;
        consumed.push(other.id.clone());
        merges += 1;

        tracing::info!(kept = %keeper.id, merged = %other.id, similarity = sim, "themes merged");
      }
    }

    Ok(merges)
  }

  /// Recompute each theme's top-K neighbours by centroid cosine similarity,
  /// descending, never including the theme itself.
  pub async fn rebuild_knn(&self, store: &dyn VectorStore) -> Result<()> {
    let themes = ThemeRecord::load_all(store).await?;

    for theme in &themes {
      let mut scored: Vec<(&str, f32)> = themes
        .iter()
        .filter(|other| other.id != theme.id)
        .map(|other| {
          (
            other.id.as_str(),
            cosine_similarity(&theme.embedding, &other.embedding),
          )
        })
        .collect();
      scored.sort_by(|a, b| b.1.total_cmp(&a.1));

      let neighbors: Vec<String> = scored
        .into_iter()
        .take(KNN_K)
        .map(|(id, _)| id.to_owned())
        .collect();
      store
        .update(
          Table::Themes,
          &theme.id,
          serde_json::json!({ "neighbor_ids": serde_json::to_string(&neighbors)? }),
        )
        .await?;
    }

    Ok(())
  }
}

async fn theme_name(model: &dyn TextModel, facts: &str) -> Result<String> {
  let name = model.complete(THEME_NAME_SYSTEM_PROMPT, facts).await?;
  Ok(
    name
      .trim()
      .trim_matches('"')
      .chars()
      .take(THEME_NAME_CHAR_LIMIT)
      .collect(),
  )
}

/// Incrementally fold one vector into a running centroid of `n` members.
fn blend_centroid(current: &[f32], incoming: &[f32], n: usize) -> Vec<f32> {
  if current.len() != incoming.len() || current.is_empty() {
    return incoming.to_vec();
  }
  let n = n as f32;
  current
    .iter()
    .zip(incoming)
    .map(|(c, x)| (c * n + x) / (n + 1.0))
    .collect()
}

/// Two-means clustering seeded with the first and last element. Guarantees
/// both sides non-empty by moving one element across when needed.
fn two_means(embeddings: &[&[f32]], iterations: usize) -> (Vec<usize>, Vec<usize>) {
  let n = embeddings.len();
  if n < 2 {
    return ((0..n).collect(), Vec::new());
  }

  let mut center_a: Vec<f32> = embeddings[0].to_vec();
  let mut center_b: Vec<f32> = embeddings[n - 1].to_vec();
  let mut left: Vec<usize> = Vec::new();
  let mut right: Vec<usize> = Vec::new();

  for _ in 0..iterations {
    left.clear();
    right.clear();
    for (i, emb) in embeddings.iter().enumerate() {
      if cosine_similarity(emb, &center_a) >= cosine_similarity(emb, &center_b) {
        left.push(i);
      } else {
        right.push(i);
      }
    }

    if left.is_empty() {
      left.push(right.pop().expect("n >= 2"));
    } else if right.is_empty() {
      right.push(left.pop().expect("n >= 2"));
    }

    let left_vecs: Vec<&[f32]> = left.iter().map(|&i| embeddings[i]).collect();
    let right_vecs: Vec<&[f32]> = right.iter().map(|&i| embeddings[i]).collect();
    center_a = centroid(&left_vecs);
    center_b = centroid(&right_vecs);
  }

  (left, right)
}
