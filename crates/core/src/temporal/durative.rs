use stratamem_shared::cosine_similarity;
use stratamem_store::new_id;

use super::{DurativeMemory, TemporalEvent};
use crate::decay::DAY_MS;

const SUMMARY_CHAR_LIMIT: usize = 300;

/// Group temporally continuous related events into durative memories.
///
/// Events are walked in semantic-time order; the running group absorbs the
/// next event while it starts within `max_gap_days` of the group's end and
/// resembles the seed. A group becomes a memory only when it has more than
/// one member or the seed itself spans time.
pub fn build_durative(
  events: &[TemporalEvent],
  max_gap_days: f64,
  similarity_threshold: f32,
) -> Vec<DurativeMemory> {
  let mut ordered: Vec<&TemporalEvent> = events.iter().collect();
  ordered.sort_by_key(|e| e.semantic_time);

  let gap_ms = (max_gap_days * DAY_MS as f64) as i64;
  let mut memories = Vec::new();
  let mut group: Vec<&TemporalEvent> = Vec::new();
  let mut group_end = 0_i64;

  let close_group = |group: &mut Vec<&TemporalEvent>, group_end: i64| {
    let Some(seed) = group.first() else {
      return None;
    };
    if group.len() < 2 && seed.duration_ms == 0 {
      group.clear();
      return None;
    }

    let mut summary: String = group
      .iter()
      .map(|e| e.content.as_str())
      .collect::<Vec<_>>()
      .join("; ");
    if summary.chars().count() > SUMMARY_CHAR_LIMIT {
      summary = summary.chars().take(SUMMARY_CHAR_LIMIT).collect();
    }

    let memory = DurativeMemory {
      id: new_id(),
      summary,
      start_time: seed.semantic_time,
      end_time: group_end.max(seed.semantic_time),
      member_ids: group.iter().map(|e| e.id.clone()).collect(),
      theme_tag: String::new(),
      embedding: seed.embedding.clone(),
    };
    group.clear();
    Some(memory)
  };

  for event in ordered {
    if let Some(seed) = group.first() {
      let within_gap = event.semantic_time - group_end <= gap_ms;
      let related = cosine_similarity(&event.embedding, &seed.embedding) >= similarity_threshold;
      if within_gap && related {
        group_end = group_end.max(event.semantic_time + event.duration_ms);
        group.push(event);
        continue;
      }
      if let Some(memory) = close_group(&mut group, group_end) {
        memories.push(memory);
      }
    }
    group_end = event.semantic_time + event.duration_ms;
    group.push(event);
  }

  if let Some(memory) = close_group(&mut group, group_end) {
    memories.push(memory);
  }

  memories
}

#[cfg(test)]
mod tests {
  use super::*;

  fn event(id: &str, day: i64, embedding: Vec<f32>) -> TemporalEvent {
    TemporalEvent {
      id: id.to_owned(),
      content: format!("event {id}"),
      semantic_time: day * DAY_MS,
      dialogue_time: day * DAY_MS,
      duration_ms: 0,
      episode_id: id.to_owned(),
      embedding,
    }
  }

  #[test]
  fn close_related_events_form_one_durative() {
    let events = vec![
      event("a", 0, vec![1.0, 0.0]),
      event("b", 1, vec![0.95, 0.05]),
      event("c", 2, vec![0.9, 0.1]),
    ];
    let memories = build_durative(&events, 3.0, 0.6);
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].member_ids, vec!["a", "b", "c"]);
    assert_eq!(memories[0].start_time, 0);
    assert_eq!(memories[0].end_time, 2 * DAY_MS);
  }

  #[test]
  fn wide_gap_splits_groups() {
    let events = vec![
      event("a", 0, vec![1.0, 0.0]),
      event("b", 1, vec![1.0, 0.0]),
      event("c", 30, vec![1.0, 0.0]),
      event("d", 31, vec![1.0, 0.0]),
    ];
    let memories = build_durative(&events, 3.0, 0.6);
    assert_eq!(memories.len(), 2);
    assert_eq!(memories[0].member_ids, vec!["a", "b"]);
    assert_eq!(memories[1].member_ids, vec!["c", "d"]);
  }

  #[test]
  fn unrelated_events_do_not_group() {
    let events = vec![
      event("a", 0, vec![1.0, 0.0]),
      event("b", 1, vec![0.0, 1.0]),
    ];
    assert!(build_durative(&events, 3.0, 0.6).is_empty());
  }

  #[test]
  fn lone_point_event_is_not_durative() {
    let events = vec![event("a", 0, vec![1.0, 0.0])];
    assert!(build_durative(&events, 3.0, 0.6).is_empty());
  }

  #[test]
  fn lone_spanning_event_is_durative() {
    let mut spanning = event("a", 0, vec![1.0, 0.0]);
    spanning.duration_ms = 7 * DAY_MS;
    let memories = build_durative(&[spanning], 3.0, 0.6);
    assert_eq!(memories.len(), 1);
    assert_eq!(memories[0].end_time, 7 * DAY_MS);
  }
}
