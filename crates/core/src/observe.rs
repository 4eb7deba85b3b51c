use std::collections::VecDeque;

use crate::retrieval::StageTwoDecision;

pub const TRACE_RING_CAP: usize = 100;

/// A follow-up query arriving within this window marks the previous
/// retrieval as unsatisfied.
const UNSATISFIED_WINDOW_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Satisfaction {
  Satisfied,
  Unsatisfied,
  Unknown,
}

/// One record per retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalTrace {
  pub query: String,
  pub timestamp: i64,
  pub matched_themes: Vec<String>,
  pub fact_previews: Vec<String>,
  pub expanded_episode_ids: Vec<String>,
  pub decision: StageTwoDecision,
  pub tokens_injected: usize,
  pub satisfaction: Satisfaction,
  pub agent_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ObservabilityReport {
  pub traces: usize,
  /// Share of retrievals that surfaced at least one fact.
  pub hit_rate: f64,
  pub avg_tokens: f64,
  /// Satisfied share of the rated traces.
  pub satisfaction_rate: f64,
  pub swallowed_failures: u64,
}

/// Per-process trace ring feeding the feedback tuner. Written only from
/// the hook path.
pub struct Observability {
  ring: VecDeque<RetrievalTrace>,
  swallowed_failures: u64,
}

impl Default for Observability {
  fn default() -> Self {
    Self::new()
  }
}

impl Observability {
  #[must_use]
  pub fn new() -> Self {
    Self {
      ring: VecDeque::with_capacity(TRACE_RING_CAP),
      swallowed_failures: 0,
    }
  }

  /// Append a trace, rating the previous one by arrival gap: a follow-up
  /// inside the window reads as dissatisfaction with what was injected.
  pub fn record(&mut self, trace: RetrievalTrace) {
    if let Some(prev) = self.ring.back_mut()
      && prev.satisfaction == Satisfaction::Unknown
    {
      prev.satisfaction = if trace.timestamp - prev.timestamp < UNSATISFIED_WINDOW_MS {
        Satisfaction::Unsatisfied
      } else {
        Satisfaction::Satisfied
      };
    }

    if self.ring.len() == TRACE_RING_CAP {
      self.ring.pop_front();
    }
    self.ring.push_back(trace);
  }

  /// Count a failure swallowed at a hook boundary.
  pub fn note_swallowed(&mut self) {
    self.swallowed_failures += 1;
  }

  #[must_use]
  pub fn traces(&self) -> Vec<RetrievalTrace> {
    self.ring.iter().cloned().collect()
  }

  #[must_use]
  pub fn report(&self) -> ObservabilityReport {
    let total = self.ring.len();
    if total == 0 {
      return ObservabilityReport {
        swallowed_failures: self.swallowed_failures,
        ..ObservabilityReport::default()
      };
    }

    let hits = self.ring.iter().filter(|t| !t.fact_previews.is_empty()).count();
    let tokens: usize = self.ring.iter().map(|t| t.tokens_injected).sum();
    let rated: Vec<&RetrievalTrace> = self
      .ring
      .iter()
      .filter(|t| t.satisfaction != Satisfaction::Unknown)
      .collect();
    let satisfied = rated
      .iter()
      .filter(|t| t.satisfaction == Satisfaction::Satisfied)
      .count();

    ObservabilityReport {
      traces: total,
      hit_rate: hits as f64 / total as f64,
      avg_tokens: tokens as f64 / total as f64,
      satisfaction_rate: if rated.is_empty() {
        0.0
      } else {
        satisfied as f64 / rated.len() as f64
      },
      swallowed_failures: self.swallowed_failures,
    }
  }
}
