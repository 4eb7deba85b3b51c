use stratamem_store::EpisodeRecord;

use super::{TemporalEvent, TemporalRange};
use crate::decay::DAY_MS;

/// Candidates scoring below this are dropped from a temporal query.
const SCORE_FLOOR: f32 = 0.1;

/// Proximity falls to zero this many windows away from the range centre.
const PROXIMITY_WINDOWS: f64 = 3.0;

fn proximity(time: i64, range: &TemporalRange) -> f32 {
  if time >= range.start && time <= range.end {
    return 1.0;
  }
  let centre = (range.start + range.end) / 2;
  let window = (range.end - range.start).max(DAY_MS) as f64;
  let distance = (time - centre).abs() as f64;
  (1.0 - distance / (PROXIMITY_WINDOWS * window)).max(0.0) as f32
}

/// Rescore episodes for a temporal query: full score when an associated
/// event (or, for episodes without events, `created_at`) falls inside the
/// asked-about window, linear proximity to the window centre otherwise.
/// Low scorers are dropped and the rest sorted descending.
pub fn rerank_episodes(
  episodes: Vec<EpisodeRecord>,
  events: &[TemporalEvent],
  range: &TemporalRange,
) -> Vec<(EpisodeRecord, f32)> {
  let mut scored: Vec<(EpisodeRecord, f32)> = episodes
    .into_iter()
    .map(|episode| {
      let score = events
        .iter()
        .filter(|e| e.episode_id == episode.id)
        .map(|e| proximity(e.semantic_time, range))
        .fold(None::<f32>, |best, s| Some(best.map_or(s, |b| b.max(s))))
        .unwrap_or_else(|| proximity(episode.created_at, range));
      (episode, score)
    })
    .filter(|(_, score)| *score >= SCORE_FLOOR)
    .collect();

  scored.sort_by(|a, b| b.1.total_cmp(&a.1));
  scored
}

#[cfg(test)]
mod tests {
  use super::*;

  fn episode(id: &str, created_at: i64) -> EpisodeRecord {
    EpisodeRecord {
      id: id.to_owned(),
      summary: format!("episode {id}"),
      turn_start: 0,
      turn_end: 0,
      message_count: 0,
      session_id: "s".to_owned(),
      created_at,
      embedding: Vec::new(),
      raw_messages: "[]".to_owned(),
    }
  }

  #[test]
  fn only_the_episode_inside_the_window_survives() {
    let now = 100 * DAY_MS;
    let range = TemporalRange {
      start: now - DAY_MS,
      end: now,
      expression: "yesterday".to_owned(),
    };
    let recent = episode("recent", now - DAY_MS / 2);
    let old = episode("old", now - 10 * DAY_MS);

    let ranked = rerank_episodes(vec![old, recent], &[], &range);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].0.id, "recent");
    assert_eq!(ranked[0].1, 1.0);
  }

  #[test]
  fn event_time_overrides_created_at() {
    let now = 100 * DAY_MS;
    let range = TemporalRange {
      start: now - DAY_MS,
      end: now,
      expression: "yesterday".to_owned(),
    };
    // Discussed long ago, but the event happened inside the window.
    let discussed_early = episode("e1", now - 30 * DAY_MS);
    let events = vec![TemporalEvent {
      id: "e1".to_owned(),
      content: String::new(),
      semantic_time: now - DAY_MS / 2,
      dialogue_time: now - 30 * DAY_MS,
      duration_ms: 0,
      episode_id: "e1".to_owned(),
      embedding: Vec::new(),
    }];

    let ranked = rerank_episodes(vec![discussed_early], &events, &range);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].1, 1.0);
  }

  #[test]
  fn near_misses_score_by_proximity() {
    let now = 100 * DAY_MS;
    let range = TemporalRange {
      start: now - DAY_MS,
      end: now,
      expression: "yesterday".to_owned(),
    };
    let near = episode("near", now - 2 * DAY_MS);
    let ranked = rerank_episodes(vec![near], &[], &range);
    assert_eq!(ranked.len(), 1);
    assert!(ranked[0].1 < 1.0 && ranked[0].1 > SCORE_FLOOR);
  }
}
