use std::sync::LazyLock;

use regex::Regex;
use stratamem_shared::{overlap_ratio, shared_token_count};

use crate::host::HostTools;

/// Autonomous memory edits decided each turn, without LLM calls.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryDecision {
  Store {
    content: String,
    category: String,
    importance: f32,
  },
  Discard {
    target: String,
  },
  Summarize {
    content: String,
    importance: f32,
    sources: Vec<String>,
  },
}

/// Inputs to a decision pass. Decisions are a pure function of this
/// context: running it twice yields the same set.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
  pub query: &'a str,
  pub output: &'a str,
  pub memories: &'a [String],
}

const MAX_STORES_PER_TURN: usize = 3;
const MAX_DISCARDS_PER_TURN: usize = 2;
const MIN_SENTENCE_CHARS: usize = 15;
const MAX_SENTENCE_CHARS: usize = 300;
/// Sentences overlapping an existing memory beyond this are not re-stored.
const STORE_OVERLAP_CEILING: f32 = 0.4;
/// A correction discards memories sharing at least this many tokens.
const DISCARD_SHARED_TOKENS: usize = 2;
/// Cluster size that triggers a consolidation.
const SUMMARIZE_CLUSTER_SIZE: usize = 5;
const SUMMARIZE_OVERLAP_FLOOR: f32 = 0.3;
const SUMMARIZE_IMPORTANCE: f32 = 0.9;
const SUMMARIZE_CHAR_LIMIT: usize = 300;

static FACTUAL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"(?i)\d|\b(is|are|was|were|costs?|supports?|requires?|released|uses|runs on|defaults? to)\b|是|为|支持|需要|版本|价格|默认",
  )
  .expect("factual marker compiles")
});

static CORRECTION: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\b(no|wrong|incorrect|not right|actually|that's not)\b|不对|错了|不是|搞错")
    .expect("correction pattern compiles")
});

static VERSION_TOKEN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\bv?\d+\.\d+(\.\d+)?\b").expect("version pattern compiles"));

static CODE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"[a-z0-9]+[A-Z][A-Za-z0-9]*|`[^`]+`|\b\w+::\w+\b|\b\w+_\w+\b")
    .expect("code token pattern compiles")
});

fn split_sentences(text: &str) -> Vec<&str> {
  text
    .split(['.', '!', '?', '。', '！', '？', '\n'])
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .collect()
}

/// Importance in [0, 1] from concrete-detail signals: numbers, version
/// tokens, overlap with the query, and code-shaped tokens.
fn importance_of(sentence: &str, query: &str) -> f32 {
  let mut score = 0.0;
  if sentence.chars().any(|c| c.is_ascii_digit()) {
    score += 0.25;
  }
  if VERSION_TOKEN.is_match(sentence) {
    score += 0.2;
  }
  if CODE_TOKEN.is_match(sentence) {
    score += 0.2;
  }
  score += 0.35 * overlap_ratio(query, sentence);
  score.clamp(0.0, 1.0)
}

/// Decide this turn's memory edits. Store factual novel sentences, discard
/// memories contradicted by a correction, consolidate crowded clusters.
pub fn decide(ctx: &DecisionContext<'_>) -> Vec<MemoryDecision> {
  let mut decisions = Vec::new();

  // ── store ──
  let mut stored = 0;
  for sentence in split_sentences(ctx.output) {
    if stored == MAX_STORES_PER_TURN {
      break;
    }
    let chars = sentence.chars().count();
    if chars < MIN_SENTENCE_CHARS || chars > MAX_SENTENCE_CHARS {
      continue;
    }
    if !FACTUAL_MARKER.is_match(sentence) {
      continue;
    }
    let known = ctx
      .memories
      .iter()
      .any(|m| overlap_ratio(sentence, m) >= STORE_OVERLAP_CEILING);
    if known {
      continue;
    }

    decisions.push(MemoryDecision::Store {
      content: sentence.to_owned(),
      category: "fact".to_owned(),
      importance: importance_of(sentence, ctx.query),
    });
    stored += 1;
  }

  // ── discard ──
  if CORRECTION.is_match(ctx.query) {
    let mut discarded = 0;
    for memory in ctx.memories {
      if discarded == MAX_DISCARDS_PER_TURN {
        break;
      }
      if shared_token_count(ctx.query, memory) >= DISCARD_SHARED_TOKENS {
        decisions.push(MemoryDecision::Discard {
          target: memory.clone(),
        });
        discarded += 1;
      }
    }
  }

  // ── summarize ──
  if ctx.memories.len() >= SUMMARIZE_CLUSTER_SIZE
    && let Some(cluster) = find_cluster(ctx.memories)
  {
    let mut content = cluster.join("; ");
    if content.chars().count() > SUMMARIZE_CHAR_LIMIT {
      content = content.chars().take(SUMMARIZE_CHAR_LIMIT).collect();
    }
    decisions.push(MemoryDecision::Summarize {
      content,
      importance: SUMMARIZE_IMPORTANCE,
      sources: cluster,
    });
  }

  decisions
}

/// First cluster of ≥ 5 memories whose word overlap with the seed exceeds
/// the floor, in input order.
fn find_cluster(memories: &[String]) -> Option<Vec<String>> {
  for (i, seed) in memories.iter().enumerate() {
    let mut cluster = vec![seed.clone()];
    for other in memories.iter().skip(i + 1) {
      if overlap_ratio(seed, other) > SUMMARIZE_OVERLAP_FLOOR
        || overlap_ratio(other, seed) > SUMMARIZE_OVERLAP_FLOOR
      {
        cluster.push(other.clone());
      }
    }
    if cluster.len() >= SUMMARIZE_CLUSTER_SIZE {
      return Some(cluster);
    }
  }
  None
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutionReport {
  pub applied: usize,
  pub failed: usize,
  pub skipped: usize,
}

/// Apply decisions through the host callbacks. Failures are swallowed and
/// counted; absent callbacks count as skipped.
pub async fn execute(decisions: &[MemoryDecision], tools: &HostTools) -> ExecutionReport {
  let mut report = ExecutionReport::default();

  for decision in decisions {
    let outcome = match decision {
      MemoryDecision::Store {
        content,
        category,
        importance,
      } => match &tools.memory_store {
        Some(store) => Some(store(content.clone(), category.clone(), *importance).await),
        None => None,
      },
      MemoryDecision::Discard { target } => match &tools.memory_forget {
        Some(forget) => Some(forget(target.clone()).await),
        None => None,
      },
      MemoryDecision::Summarize {
        content,
        importance,
        ..
      } => match &tools.memory_store {
        Some(store) => {
          Some(store(content.clone(), "consolidated".to_owned(), *importance).await)
        }
        None => None,
      },
    };

    match outcome {
      Some(Ok(())) => report.applied += 1,
      Some(Err(err)) => {
        tracing::warn!(error = %err, "memory edit failed");
        report.failed += 1;
      }
      None => report.skipped += 1,
    }
  }

  report
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stores_factual_sentences_capped_at_three() {
    let ctx = DecisionContext {
      query: "tell me about the stack",
      output: "The backend is written in Rust. The database is Postgres 16. \
               The cache layer uses Redis 7. The queue runs on NATS streams.",
      memories: &[],
    };
    let decisions = decide(&ctx);
    let stores = decisions
      .iter()
      .filter(|d| matches!(d, MemoryDecision::Store { .. }))
      .count();
    assert_eq!(stores, MAX_STORES_PER_TURN);
  }

  #[test]
  fn known_facts_are_not_restored() {
    let memories = vec!["The database is Postgres 16".to_owned()];
    let ctx = DecisionContext {
      query: "db?",
      output: "The database is Postgres 16.",
      memories: &memories,
    };
    assert!(decide(&ctx).is_empty());
  }

  #[test]
  fn chinese_correction_discards_the_stored_price() {
    let memories = vec!["产品价格是 50 元每月".to_owned()];
    let ctx = DecisionContext {
      query: "不对，产品价格应该是 100 元不是 50 元",
      output: "明白了，已更正。",
      memories: &memories,
    };
    let decisions = decide(&ctx);
    assert!(decisions.iter().any(|d| matches!(
      d,
      MemoryDecision::Discard { target } if target == "产品价格是 50 元每月"
    )));
  }

  #[test]
  fn crowded_cluster_triggers_one_summarize() {
    let memories: Vec<String> = (0..5)
      .map(|i| format!("the deploy pipeline uses docker stage {i}"))
      .collect();
    let ctx = DecisionContext {
      query: "",
      output: "",
      memories: &memories,
    };
    let decisions = decide(&ctx);
    let summaries: Vec<_> = decisions
      .iter()
      .filter(|d| matches!(d, MemoryDecision::Summarize { .. }))
      .collect();
    assert_eq!(summaries.len(), 1);
    if let MemoryDecision::Summarize { importance, sources, .. } = summaries[0] {
      assert_eq!(*importance, SUMMARIZE_IMPORTANCE);
      assert_eq!(sources.len(), 5);
    }
  }

  #[test]
  fn decide_is_idempotent() {
    let memories = vec!["产品价格是 50 元每月".to_owned()];
    let ctx = DecisionContext {
      query: "不对，产品价格应该是 100 元",
      output: "价格已更新为 100 元每月。",
      memories: &memories,
    };
    assert_eq!(decide(&ctx), decide(&ctx));
  }

  #[test]
  fn importance_rises_with_concrete_detail() {
    let vague = importance_of("the team likes the new design", "design");
    let concrete = importance_of("ServiceMesh v2.4 requires 3 replicas", "ServiceMesh replicas");
    assert!(concrete > vague);
  }
}
