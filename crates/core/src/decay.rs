use stratamem_shared::Result;
use stratamem_store::{EpisodeRecord, SemanticRecord, Table, ThemeRecord, VectorStore};

pub const DAY_MS: i64 = 86_400_000;

/// Records older than this multiple of their half-life are deleted.
const EXPIRY_HALF_LIVES: f64 = 3.0;

/// Inactivity window after which a theme is marked dormant.
const DORMANT_AFTER_DAYS: f64 = 30.0;

/// Raw-message blob contents after stripping. The episode row survives with
/// this sentinel until its own expiry.
const STRIPPED_BLOB: &str = "[]";

/// Forgetting-curve policy. `None` half-life means never forget.
#[derive(Debug, Clone)]
pub struct DecayPolicy {
  pub theme_half_life_days: Option<f64>,
  pub semantic_half_life_days: f64,
  pub episode_half_life_days: f64,
  pub message_retain_days: f64,
}

impl Default for DecayPolicy {
  fn default() -> Self {
    Self {
      theme_half_life_days: None,
      semantic_half_life_days: 180.0,
      episode_half_life_days: 30.0,
      message_retain_days: 7.0,
    }
  }
}

/// `0.5^(age / half_life)`, or 1.0 for an infinite half-life. Used to
/// down-weight retrieval candidates by age.
pub fn decay_weight(created_at_ms: i64, now_ms: i64, half_life_days: Option<f64>) -> f64 {
  let Some(half_life) = half_life_days else {
    return 1.0;
  };
  let age_days = (now_ms - created_at_ms).max(0) as f64 / DAY_MS as f64;
  0.5_f64.powf(age_days / half_life)
}

#[derive(Debug, Default, Clone)]
pub struct DecayReport {
  pub episodes_deleted: usize,
  pub semantics_deleted: usize,
  pub blobs_stripped: usize,
  pub themes_marked_dormant: usize,
}

/// Weekly forgetting sweep over the full store.
///
/// Scans every row (never a bounded search proxy): expired episodes and
/// semantics are deleted, aged raw-message blobs are blanked in place, and
/// stale themes are marked dormant but kept. Deleting a semantic also
/// removes it from its theme's member list; episode references from
/// surviving semantics are allowed to dangle.
pub async fn decay_sweep(
  store: &dyn VectorStore,
  policy: &DecayPolicy,
  now_ms: i64,
) -> Result<DecayReport> {
  let mut report = DecayReport::default();

  let episode_expiry = (EXPIRY_HALF_LIVES * policy.episode_half_life_days * DAY_MS as f64) as i64;
  let retain = (policy.message_retain_days * DAY_MS as f64) as i64;
  for episode in EpisodeRecord::load_all(store).await? {
    let age = now_ms - episode.created_at;
    if age > episode_expiry {
      store.delete(Table::Episodes, &episode.id).await?;
      report.episodes_deleted += 1;
    } else if age > retain && episode.raw_messages != STRIPPED_BLOB {
      store
        .update(
          Table::Episodes,
          &episode.id,
          serde_json::json!({ "raw_messages": STRIPPED_BLOB }),
        )
        .await?;
      report.blobs_stripped += 1;
    }
  }

  let semantic_expiry = (EXPIRY_HALF_LIVES * policy.semantic_half_life_days * DAY_MS as f64) as i64;
  for row in store.scan_all(Table::Semantics).await? {
    let semantic = SemanticRecord::from_row(&row)?;
    if now_ms - semantic.created_at <= semantic_expiry {
      continue;
    }
    store.delete(Table::Semantics, &semantic.id).await?;
    report.semantics_deleted += 1;

    if let Some(mut theme) = ThemeRecord::find(store, &semantic.theme_id).await? {
      theme.semantic_ids.retain(|id| id != &semantic.id);
      theme.save(store).await?;
    }
  }

  let dormant_after = (DORMANT_AFTER_DAYS * DAY_MS as f64) as i64;
  for theme in ThemeRecord::load_all(store).await? {
    if !theme.dormant && now_ms - theme.last_active > dormant_after {
      store
        .update(
          Table::Themes,
          &theme.id,
          serde_json::json!({ "dormant": true }),
        )
        .await?;
      report.themes_marked_dormant += 1;
    }
  }

  tracing::info!(
    episodes_deleted = report.episodes_deleted,
    semantics_deleted = report.semantics_deleted,
    blobs_stripped = report.blobs_stripped,
    themes_marked_dormant = report.themes_marked_dormant,
    "decay sweep finished"
  );
  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fresh_records_keep_full_weight() {
    assert!((decay_weight(1_000, 1_000, Some(30.0)) - 1.0).abs() < 1e-9);
  }

  #[test]
  fn weight_halves_at_half_life() {
    let now = 30 * DAY_MS;
    assert!((decay_weight(0, now, Some(30.0)) - 0.5).abs() < 1e-9);
  }

  #[test]
  fn infinite_half_life_never_decays() {
    let now = 10_000 * DAY_MS;
    assert_eq!(decay_weight(0, now, None), 1.0);
  }

  #[test]
  fn future_timestamps_clamp_to_full_weight() {
    assert_eq!(decay_weight(5_000, 1_000, Some(30.0)), 1.0);
  }
}
