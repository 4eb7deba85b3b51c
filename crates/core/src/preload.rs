use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use stratamem_shared::cosine_similarity;
use stratamem_store::{EpisodeRecord, ThemeRecord};

/// A theme must recur this often in a bucket before it becomes a hint.
const MIN_BUCKET_OBSERVATIONS: usize = 3;

/// Hints kept per bucket.
const TOP_THEMES_PER_BUCKET: usize = 2;

/// Session themes that historically dominate a (weekday, 3-hour) slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadRule {
  /// Monday = 0.
  pub weekday: u32,
  /// Hour of day / 3.
  pub bucket: u32,
  pub theme_ids: Vec<String>,
}

fn bucket_of(created_at_ms: i64) -> Option<(u32, u32)> {
  let dt = DateTime::<Utc>::from_timestamp_millis(created_at_ms)?;
  Some((dt.weekday().num_days_from_monday(), dt.hour() / 3))
}

fn nearest_theme<'a>(episode: &EpisodeRecord, themes: &'a [ThemeRecord]) -> Option<&'a str> {
  themes
    .iter()
    .map(|t| (t.id.as_str(), cosine_similarity(&episode.embedding, &t.embedding)))
    .max_by(|a, b| a.1.total_cmp(&b.1))
    .map(|(id, _)| id)
}

/// Bucket past episodes by (weekday, 3-hour slot) and keep each bucket's
/// recurring themes as preload hints.
pub fn build_preload_rules(episodes: &[EpisodeRecord], themes: &[ThemeRecord]) -> Vec<PreloadRule> {
  if themes.is_empty() {
    return Vec::new();
  }

  let mut counts: HashMap<(u32, u32), HashMap<&str, usize>> = HashMap::new();
  for episode in episodes {
    let Some(bucket) = bucket_of(episode.created_at) else {
      continue;
    };
    let Some(theme_id) = nearest_theme(episode, themes) else {
      continue;
    };
    *counts.entry(bucket).or_default().entry(theme_id).or_insert(0) += 1;
  }

  let mut rules: Vec<PreloadRule> = counts
    .into_iter()
    .filter_map(|((weekday, bucket), theme_counts)| {
      let mut qualifying: Vec<(&str, usize)> = theme_counts
        .into_iter()
        .filter(|(_, n)| *n >= MIN_BUCKET_OBSERVATIONS)
        .collect();
      if qualifying.is_empty() {
        return None;
      }
      qualifying.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

      Some(PreloadRule {
        weekday,
        bucket,
        theme_ids: qualifying
          .into_iter()
          .take(TOP_THEMES_PER_BUCKET)
          .map(|(id, _)| id.to_owned())
          .collect(),
      })
    })
    .collect();

  rules.sort_by_key(|r| (r.weekday, r.bucket));
  rules
}

/// The rule covering the current (weekday, slot), if history produced one.
pub fn preload_hint<'a>(rules: &'a [PreloadRule], now: DateTime<Utc>) -> Option<&'a PreloadRule> {
  let weekday = now.weekday().num_days_from_monday();
  let bucket = now.hour() / 3;
  rules
    .iter()
    .find(|r| r.weekday == weekday && r.bucket == bucket)
}
