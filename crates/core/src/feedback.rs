use crate::observe::{RetrievalTrace, Satisfaction};

pub const ALPHA_DEFAULT: f32 = 0.5;
pub const ALPHA_MIN: f32 = 0.2;
pub const ALPHA_MAX: f32 = 0.8;
const ALPHA_STEP: f32 = 0.05;
const RATED_WINDOW: usize = 10;

/// Semantic counts below this read as a coverage problem rather than a
/// relevance problem.
const COVERAGE_SHORTFALL: usize = 3;

/// Tunes the retriever's coverage/relevance balance from rated traces.
///
/// An unsatisfied trace with few selected facts means Stage I was too
/// narrow (raise α toward coverage); an unsatisfied trace despite plenty of
/// facts means they were the wrong ones (lower α toward relevance).
#[derive(Debug, Clone)]
pub struct FeedbackTuner {
  alpha: f32,
}

impl Default for FeedbackTuner {
  fn default() -> Self {
    Self::new()
  }
}

impl FeedbackTuner {
  #[must_use]
  pub fn new() -> Self {
    Self {
      alpha: ALPHA_DEFAULT,
    }
  }

  #[must_use]
  pub fn alpha(&self) -> f32 {
    self.alpha
  }

  /// Adjust α over the last [`RATED_WINDOW`] rated traces and return the
  /// new value.
  pub fn adjust(&mut self, traces: &[RetrievalTrace]) -> f32 {
    let rated: Vec<&RetrievalTrace> = traces
      .iter()
      .filter(|t| t.satisfaction != Satisfaction::Unknown)
      .collect();

    for trace in rated.iter().rev().take(RATED_WINDOW) {
      if trace.satisfaction != Satisfaction::Unsatisfied {
        continue;
      }
      if trace.fact_previews.len() < COVERAGE_SHORTFALL {
        self.alpha += ALPHA_STEP;
      } else {
        self.alpha -= ALPHA_STEP;
      }
    }

    self.alpha = self.alpha.clamp(ALPHA_MIN, ALPHA_MAX);
    self.alpha
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::retrieval::StageTwoDecision;

  fn trace(satisfaction: Satisfaction, facts: usize) -> RetrievalTrace {
    RetrievalTrace {
      query: String::new(),
      timestamp: 0,
      matched_themes: Vec::new(),
      fact_previews: (0..facts).map(|i| format!("f{i}")).collect(),
      expanded_episode_ids: Vec::new(),
      decision: StageTwoDecision::Partial,
      tokens_injected: 0,
      satisfaction,
      agent_id: "a".to_owned(),
    }
  }

  #[test]
  fn starved_unsatisfied_traces_raise_alpha() {
    let mut tuner = FeedbackTuner::new();
    tuner.adjust(&[trace(Satisfaction::Unsatisfied, 1)]);
    assert!(tuner.alpha() > ALPHA_DEFAULT);
  }

  #[test]
  fn well_fed_unsatisfied_traces_lower_alpha() {
    let mut tuner = FeedbackTuner::new();
    tuner.adjust(&[trace(Satisfaction::Unsatisfied, 8)]);
    assert!(tuner.alpha() < ALPHA_DEFAULT);
  }

  #[test]
  fn satisfied_traces_leave_alpha_alone() {
    let mut tuner = FeedbackTuner::new();
    tuner.adjust(&[trace(Satisfaction::Satisfied, 1)]);
    assert_eq!(tuner.alpha(), ALPHA_DEFAULT);
  }

  #[test]
  fn alpha_stays_clamped() {
    let mut tuner = FeedbackTuner::new();
    let starved: Vec<RetrievalTrace> =
      (0..50).map(|_| trace(Satisfaction::Unsatisfied, 0)).collect();
    // Only the last 10 rated traces count per adjustment, so iterate.
    for _ in 0..10 {
      tuner.adjust(&starved);
    }
    assert!(tuner.alpha() <= ALPHA_MAX);
  }
}
