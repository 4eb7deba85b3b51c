mod parser;
pub use parser::{TemporalRange, parse_query};

mod extract;
pub use extract::{SemanticTime, extract_semantic_time, heuristic_semantic_time};

mod durative;
pub use durative::build_durative;

mod rerank;
pub use rerank::rerank_episodes;

use std::collections::VecDeque;

/// In-memory temporal event ring capacity.
pub const TEMPORAL_EVENT_CAP: usize = 200;

/// Gap tolerance when growing a durative group.
pub const MAX_GAP_DAYS: f64 = 3.0;

/// Seed-similarity floor for durative membership.
pub const DURATIVE_SIMILARITY_THRESHOLD: f32 = 0.6;

/// Shadow of an episode indexed by when the event *happened* rather than
/// when it was discussed.
#[derive(Debug, Clone)]
pub struct TemporalEvent {
  /// Same id as the source episode.
  pub id: String,
  pub content: String,
  pub semantic_time: i64,
  pub dialogue_time: i64,
  pub duration_ms: i64,
  pub episode_id: String,
  pub embedding: Vec<f32>,
}

/// A span-valued memory covering a contiguous real-world time range,
/// derived from temporally close related events.
#[derive(Debug, Clone)]
pub struct DurativeMemory {
  pub id: String,
  pub summary: String,
  pub start_time: i64,
  pub end_time: i64,
  pub member_ids: Vec<String>,
  pub theme_tag: String,
  pub embedding: Vec<f32>,
}

/// Per-process temporal overlay: the bounded event ring plus the durative
/// groupings recomputed on each episode flush. Written only from the hook
/// path.
pub struct TemporalLayer {
  events: VecDeque<TemporalEvent>,
  durative: Vec<DurativeMemory>,
}

impl Default for TemporalLayer {
  fn default() -> Self {
    Self::new()
  }
}

impl TemporalLayer {
  #[must_use]
  pub fn new() -> Self {
    Self {
      events: VecDeque::with_capacity(TEMPORAL_EVENT_CAP),
      durative: Vec::new(),
    }
  }

  pub fn record_event(&mut self, event: TemporalEvent) {
    if self.events.len() == TEMPORAL_EVENT_CAP {
      self.events.pop_front();
    }
    self.events.push_back(event);
  }

  pub fn rebuild_durative(&mut self) {
    let events: Vec<TemporalEvent> = self.events.iter().cloned().collect();
    self.durative = build_durative(&events, MAX_GAP_DAYS, DURATIVE_SIMILARITY_THRESHOLD);
  }

  #[must_use]
  pub fn events(&self) -> impl Iterator<Item = &TemporalEvent> {
    self.events.iter()
  }

  #[must_use]
  pub fn durative(&self) -> &[DurativeMemory] {
    &self.durative
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn event(id: &str, semantic_time: i64) -> TemporalEvent {
    TemporalEvent {
      id: id.to_owned(),
      content: String::new(),
      semantic_time,
      dialogue_time: semantic_time,
      duration_ms: 0,
      episode_id: id.to_owned(),
      embedding: vec![1.0],
    }
  }

  #[test]
  fn ring_is_bounded() {
    let mut layer = TemporalLayer::new();
    for i in 0..(TEMPORAL_EVENT_CAP + 20) {
      layer.record_event(event(&format!("e{i}"), i as i64));
    }
    assert_eq!(layer.events().count(), TEMPORAL_EVENT_CAP);
    // Oldest entries were dropped.
    assert!(layer.events().all(|e| e.semantic_time >= 20));
  }
}
