use std::collections::VecDeque;

/// Online sampler backing the distribution-aware split/merge gates.
///
/// Records observed values (theme sizes, inter-theme similarities) and
/// answers upper-tail membership against a sorted snapshot. Below the
/// minimum observation count it abstains and callers use a fixed bound.
#[derive(Debug, Clone)]
pub struct TailSampler {
  samples: VecDeque<f32>,
  cap: usize,
  min_observations: usize,
}

impl TailSampler {
  pub fn new(cap: usize, min_observations: usize) -> Self {
    Self {
      samples: VecDeque::with_capacity(cap.min(1024)),
      cap: cap.max(1),
      min_observations,
    }
  }

  pub fn record(&mut self, value: f32) {
    if self.samples.len() == self.cap {
      self.samples.pop_front();
    }
    self.samples.push_back(value);
  }

  #[must_use]
  pub fn observation_count(&self) -> usize {
    self.samples.len()
  }

  /// `Some(true)` when `value` sits at or above the `quantile` point of the
  /// observed distribution; `None` below the minimum observation count.
  pub fn in_upper_tail(&self, value: f32, quantile: f32) -> Option<bool> {
    if self.samples.len() < self.min_observations {
      return None;
    }

    let mut sorted: Vec<f32> = self.samples.iter().copied().collect();
    sorted.sort_unstable_by(f32::total_cmp);

    let idx = ((sorted.len() as f32) * quantile) as usize;
    let threshold = sorted[idx.min(sorted.len() - 1)];
    Some(value >= threshold)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn abstains_below_min_observations() {
    let mut sampler = TailSampler::new(64, 10);
    for i in 0..9 {
      sampler.record(i as f32);
    }
    assert_eq!(sampler.in_upper_tail(100.0, 0.9), None);
  }

  #[test]
  fn flags_upper_tail_values() {
    let mut sampler = TailSampler::new(64, 10);
    for i in 0..20 {
      sampler.record(i as f32);
    }
    assert_eq!(sampler.in_upper_tail(19.0, 0.9), Some(true));
    assert_eq!(sampler.in_upper_tail(5.0, 0.9), Some(false));
  }

  #[test]
  fn ring_drops_oldest_samples() {
    let mut sampler = TailSampler::new(4, 1);
    for i in 0..8 {
      sampler.record(i as f32);
    }
    assert_eq!(sampler.observation_count(), 4);
    // Only 4..8 remain, so 3.0 is below every sample.
    assert_eq!(sampler.in_upper_tail(3.0, 0.0), Some(false));
  }
}
