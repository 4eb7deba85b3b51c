use chrono::{DateTime, Datelike, Utc};
use stratamem_ai::{EmbedTask, Embedder, TextModel};
use stratamem_shared::Result;
use stratamem_store::{EpisodeRecord, Table, UserProfileRecord, VectorStore};

use crate::decay::DAY_MS;

const BEHAVIORAL_SYSTEM_PROMPT: &str = "\
From the episode summaries below, describe the user's behavioural patterns \
in 2-3 sentences: how they work, what they ask for, how they communicate. \
Output only the description.";

const COGNITIVE_SYSTEM_PROMPT: &str = "\
From the episode summaries below, describe what the user knows and is \
currently learning in 2-3 sentences: domains, tools, open questions. \
Output only the description.";

const MERGE_SYSTEM_PROMPT: &str = "\
Merge the existing profile with the new weekly phase into one coherent \
profile of at most 6 sentences. Prefer newer information on conflicts. \
Output only the merged profile.";

fn phase_label(now: DateTime<Utc>) -> String {
  let week = now.iso_week();
  format!("{}-W{:02}", week.year(), week.week())
}

/// Weekly user-profile rebuild: distil the week's episodes into behavioural
/// and cognitive texts, fold older phases into the global text, and keep
/// one latest row per (user, phase).
pub async fn rebuild_profile(
  user_id: &str,
  model: &dyn TextModel,
  embedder: &dyn Embedder,
  store: &dyn VectorStore,
  now: DateTime<Utc>,
) -> Result<Option<UserProfileRecord>> {
  let now_ms = now.timestamp_millis();
  let week_ago = now_ms - 7 * DAY_MS;

  let mut recent: Vec<EpisodeRecord> = EpisodeRecord::load_all(store)
    .await?
    .into_iter()
    .filter(|e| e.created_at >= week_ago)
    .collect();
  if recent.is_empty() {
    return Ok(None);
  }
  recent.sort_by_key(|e| e.created_at);

  let summaries: String = recent
    .iter()
    .map(|e| format!("- {}\n", e.summary))
    .collect();

  let behavioral = model.complete(BEHAVIORAL_SYSTEM_PROMPT, &summaries).await?;
  let cognitive = model.complete(COGNITIVE_SYSTEM_PROMPT, &summaries).await?;
  let phase_text = format!("{}\n{}", behavioral.trim(), cognitive.trim());

  let previous = UserProfileRecord::latest(store, user_id).await?;
  let global_text = match &previous {
    Some(prev) if !prev.global_text.is_empty() => {
      let merge_input = format!(
        "Existing profile:\n{}\n\nNew phase:\n{phase_text}",
        prev.global_text
      );
      model
        .complete(MERGE_SYSTEM_PROMPT, &merge_input)
        .await?
        .trim()
        .to_owned()
    }
    _ => phase_text.clone(),
  };

  let embedding = embedder.embed(&global_text, EmbedTask::TextMatching).await?;

  let phase = phase_label(now);
  let profile = UserProfileRecord {
    id: format!("{user_id}:{phase}"),
    user_id: user_id.to_owned(),
    phase,
    behavioral: behavioral.trim().to_owned(),
    cognitive: cognitive.trim().to_owned(),
    global_text,
    embedding,
    updated_at: now_ms,
  };
  profile.save(store).await?;

  // Older phase rows are folded into the global text above; drop them.
  for old in UserProfileRecord::for_user(store, user_id).await? {
    if old.phase != profile.phase {
      store.delete(Table::UserProfile, &old.id).await?;
    }
  }

  tracing::info!(user_id, phase = %profile.phase, "user profile rebuilt");
  Ok(Some(profile))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn phase_label_is_iso_week() {
    let now = Utc.with_ymd_and_hms(2026, 7, 29, 12, 0, 0).unwrap();
    assert_eq!(phase_label(now), "2026-W31");
  }

  #[test]
  fn phase_label_handles_year_boundary() {
    // 2027-01-01 falls in ISO week 53 of 2026.
    let now = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(phase_label(now), "2026-W53");
  }
}
