use std::sync::LazyLock;

use regex::Regex;
use stratamem_shared::{Result, overlap_ratio};

use crate::host::HostTools;

/// How unsure the assistant's last answer sounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UncertaintyLevel {
  None,
  Low,
  Medium,
  High,
}

#[derive(Debug, Clone)]
pub struct UncertaintySignal {
  pub level: UncertaintyLevel,
  pub marker_count: usize,
  pub important_question: bool,
  pub repeated_question: bool,
}

/// Which stage of the chain produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RetrievalSource {
  Memory,
  Workspace,
  Web,
}

#[derive(Debug, Clone)]
pub struct VerifiedRetrieval {
  pub source: RetrievalSource,
  pub snippets: Vec<String>,
  pub verified: bool,
  /// Up to three verified web snippets proposed as new facts.
  pub proposed_facts: Vec<String>,
}

/// Token overlap with a recent query above which a question counts as
/// repeated.
const REPEAT_OVERLAP: f32 = 0.6;

/// Share of the answer's key terms that must appear in the web text.
const VERIFY_OVERLAP: f32 = 0.3;

const MAX_PROPOSED_FACTS: usize = 3;

static HEDGE_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"(?i)\b(i think|i believe|i guess|maybe|perhaps|probably|possibly|might be|not sure|not certain|around|approximately|roughly|as far as i know|if i recall)\b|可能|大概|也许|不确定|好像|应该是|差不多|似乎",
  )
  .expect("hedge pattern compiles")
});

static IMPORTANT_QUESTION: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"(?i)\$|\bprice\b|\bcost\b|how much|\bversion\b|\bv\d|\bwhen\b|\bdate\b|\bdeadline\b|is it true|\bactually\b|多少钱|价格|费用|版本|什么时候|日期|真的|确定",
  )
  .expect("important pattern compiles")
});

static KEY_TERM: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\$?\d[\d.,]*%?|\b[A-Z][A-Za-z0-9]+\b").expect("key term pattern compiles")
});

/// Derive the uncertainty level of the last answer from hedge markers, the
/// importance of the question, and whether the question is a repeat.
pub fn assess_uncertainty(
  answer: &str,
  question: &str,
  recent_queries: &[String],
) -> UncertaintySignal {
  let marker_count = HEDGE_MARKERS.find_iter(answer).count();
  let important_question = IMPORTANT_QUESTION.is_match(question);
  let repeated_question = recent_queries
    .iter()
    .rev()
    .take(3)
    .any(|prev| overlap_ratio(question, prev) >= REPEAT_OVERLAP);

  let mut level = match marker_count {
    0 => UncertaintyLevel::None,
    1 if !important_question => UncertaintyLevel::Low,
    1 | 2 => UncertaintyLevel::Medium,
    _ => UncertaintyLevel::High,
  };

  // Asking the same thing again means the last answer did not land.
  if repeated_question {
    level = level.max(UncertaintyLevel::Medium);
  }

  UncertaintySignal {
    level,
    marker_count,
    important_question,
    repeated_question,
  }
}

/// Proper-noun and number tokens from the answer, used for web
/// cross-verification.
pub fn key_terms(answer: &str) -> Vec<String> {
  let mut terms: Vec<String> = Vec::new();
  for m in KEY_TERM.find_iter(answer) {
    let term = m.as_str();
    if term.chars().count() < 2 {
      continue;
    }
    if !terms.iter().any(|t| t == term) {
      terms.push(term.to_owned());
    }
  }
  terms
}

/// At least 30% of the answer's key terms must appear in the joined web
/// text. An answer with no key terms cannot be verified.
pub fn cross_verify(answer: &str, web_text: &str) -> bool {
  let terms = key_terms(answer);
  if terms.is_empty() {
    return false;
  }
  let haystack = web_text.to_lowercase();
  let matched = terms
    .iter()
    .filter(|t| haystack.contains(&t.to_lowercase()))
    .count();
  matched as f32 / terms.len() as f32 >= VERIFY_OVERLAP
}

/// Drive the memory → workspace → web chain, stopping on the first
/// non-empty result. One call per tool per turn; web search only engages
/// from `medium` up. Callback failures degrade to an empty stage.
pub async fn run_chain(
  signal: &UncertaintySignal,
  question: &str,
  answer: &str,
  tools: &HostTools,
) -> Result<Option<VerifiedRetrieval>> {
  let engaged = match signal.level {
    UncertaintyLevel::None => false,
    UncertaintyLevel::Low => signal.important_question,
    UncertaintyLevel::Medium | UncertaintyLevel::High => true,
  };
  if !engaged {
    return Ok(None);
  }

  if let Some(recall) = &tools.memory_recall {
    match recall(question.to_owned()).await {
      Ok(hits) if !hits.is_empty() => {
        return Ok(Some(VerifiedRetrieval {
          source: RetrievalSource::Memory,
          snippets: hits,
          verified: true,
          proposed_facts: Vec::new(),
        }));
      }
      Ok(_) => {}
      Err(err) => tracing::warn!(error = %err, "memory recall failed, continuing chain"),
    }
  }

  if let Some(grep) = &tools.workspace_grep {
    match grep(question.to_owned()).await {
      Ok(hits) if !hits.is_empty() => {
        return Ok(Some(VerifiedRetrieval {
          source: RetrievalSource::Workspace,
          snippets: hits,
          verified: true,
          proposed_facts: Vec::new(),
        }));
      }
      Ok(_) => {}
      Err(err) => tracing::warn!(error = %err, "workspace grep failed, continuing chain"),
    }
  }

  if signal.level >= UncertaintyLevel::Medium
    && let Some(search) = &tools.web_search
  {
    match search(question.to_owned()).await {
      Ok(snippets) if !snippets.is_empty() => {
        let verified = cross_verify(answer, &snippets.join("\n"));
        let proposed_facts = if verified {
          snippets.iter().take(MAX_PROPOSED_FACTS).cloned().collect()
        } else {
          Vec::new()
        };
        return Ok(Some(VerifiedRetrieval {
          source: RetrievalSource::Web,
          snippets,
          verified,
          proposed_facts,
        }));
      }
      Ok(_) => {}
      Err(err) => tracing::warn!(error = %err, "web search failed"),
    }
  }

  Ok(None)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn no_markers_is_none() {
    let signal = assess_uncertainty("It costs $50 per month.", "how much does it cost?", &[]);
    assert_eq!(signal.marker_count, 0);
    assert_eq!(signal.level, UncertaintyLevel::None);
  }

  #[test]
  fn hedged_price_answer_is_medium_and_important() {
    let signal = assess_uncertainty(
      "I think it costs around $50",
      "how much does it cost?",
      &[],
    );
    assert!(signal.important_question);
    assert_eq!(signal.level, UncertaintyLevel::Medium);
  }

  #[test]
  fn single_hedge_on_casual_question_is_low() {
    let signal = assess_uncertainty(
      "Maybe the blue one looks better",
      "which color should I pick?",
      &[],
    );
    assert_eq!(signal.level, UncertaintyLevel::Low);
  }

  #[test]
  fn many_hedges_are_high() {
    let signal = assess_uncertainty(
      "I think it's maybe possible, probably, as far as I know",
      "which color should I pick?",
      &[],
    );
    assert!(signal.marker_count > 2);
    assert_eq!(signal.level, UncertaintyLevel::High);
  }

  #[test]
  fn chinese_hedges_count() {
    let signal = assess_uncertainty("可能是三月发布的，不确定", "发布日期是什么时候", &[]);
    assert_eq!(signal.marker_count, 2);
    assert_eq!(signal.level, UncertaintyLevel::Medium);
  }

  #[test]
  fn repeated_question_promotes_to_medium() {
    let recents = vec!["how do I configure the linter".to_owned()];
    let signal = assess_uncertainty(
      "You set it in the config file.",
      "how do I configure the linter?",
      &recents,
    );
    assert!(signal.repeated_question);
    assert_eq!(signal.level, UncertaintyLevel::Medium);
  }

  #[test]
  fn cross_verify_passes_on_shared_price() {
    assert!(cross_verify(
      "I think it costs around $50",
      "Official pricing: $50 per month"
    ));
  }

  #[test]
  fn cross_verify_fails_on_disjoint_text() {
    assert!(!cross_verify(
      "I think Postgres 16 is required",
      "The weather today is sunny with light wind"
    ));
  }

  #[test]
  fn key_terms_pick_numbers_and_proper_nouns() {
    let terms = key_terms("Rust 1.91 ships with Cargo improvements, costing $0");
    assert!(terms.iter().any(|t| t == "Rust"));
    assert!(terms.iter().any(|t| t == "1.91"));
    assert!(terms.iter().any(|t| t == "Cargo"));
    assert!(terms.iter().any(|t| t == "$0"));
  }

  #[tokio::test]
  async fn none_level_skips_the_chain() {
    let signal = assess_uncertainty("It costs $50.", "how much?", &[]);
    let tools = HostTools::default();
    let result = run_chain(&signal, "how much?", "It costs $50.", &tools)
      .await
      .unwrap();
    assert!(result.is_none());
  }
}
