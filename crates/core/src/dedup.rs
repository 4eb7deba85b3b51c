use std::collections::HashSet;

use stratamem_shared::Result;
use stratamem_store::{SemanticRecord, Table, ThemeRecord, VectorStore};

/// Intra-theme cosine distance below which two facts are duplicates at
/// steady state.
const STEADY_STATE_DISTANCE: f32 = 0.10;

/// Neighbours probed per fact. Self plus a handful of near entries.
const PROBE_LIMIT: usize = 6;

/// Weekly duplicate sweep over the semantics table.
///
/// Probes each fact's vector neighbourhood instead of scanning all pairs,
/// so cost stays proportional to table size. Within a theme, the younger
/// of two near-identical facts is deleted; its episode back-pointers fold
/// into the survivor. Returns the number of deletions.
pub async fn dedup_sweep(store: &dyn VectorStore) -> Result<usize> {
  let rows = store.scan_all(Table::Semantics).await?;
  let mut facts = rows
    .iter()
    .map(SemanticRecord::from_row)
    .collect::<Result<Vec<_>>>()?;
  facts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

  let mut removed: HashSet<String> = HashSet::new();
  let mut deletions = 0;

  for fact in &facts {
    if removed.contains(&fact.id) {
      continue;
    }

    let neighbours = store
      .search(Table::Semantics, &fact.embedding, PROBE_LIMIT)
      .await?;

    for hit in neighbours {
      if hit.row.id == fact.id || removed.contains(&hit.row.id) {
        continue;
      }
      if 1.0 - hit.score >= STEADY_STATE_DISTANCE {
        continue;
      }
      let duplicate = SemanticRecord::from_row(&hit.row)?;
      if duplicate.theme_id != fact.theme_id {
        continue;
      }
      // The sort above makes `fact` the elder of the pair.
      if duplicate.created_at < fact.created_at {
        continue;
      }

      let mut survivor = match SemanticRecord::find(store, &fact.id).await? {
        Some(s) => s,
        None => continue,
      };
      for episode_id in &duplicate.episode_ids {
        if !survivor.episode_ids.contains(episode_id) {
          survivor.episode_ids.push(episode_id.clone());
        }
      }
      survivor.save(store).await?;

      store.delete(Table::Semantics, &duplicate.id).await?;
      if let Some(mut theme) = ThemeRecord::find(store, &duplicate.theme_id).await? {
        theme.semantic_ids.retain(|id| id != &duplicate.id);
        theme.save(store).await?;
      }

      removed.insert(duplicate.id.clone());
      deletions += 1;
      tracing::debug!(kept = %fact.id, dropped = %duplicate.id, "deduplicated semantics");
    }
  }

  if deletions > 0 {
    tracing::info!(deletions, "dedup sweep finished");
  }
  Ok(deletions)
}
