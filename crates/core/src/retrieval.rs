use std::collections::HashSet;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use chrono_humanize::HumanTime;
use stratamem_ai::TextModel;
use stratamem_shared::{Result, cosine_similarity, estimate_tokens};
use stratamem_store::{EpisodeRecord, SemanticRecord, ThemeRecord, VectorStore};

use crate::decay::{DecayPolicy, decay_weight};

/// Stage-I theme candidates fetched by query similarity.
const THEME_CANDIDATES: usize = 5;
/// Themes the greedy coverage pass may select.
const MAX_SELECTED_THEMES: usize = 3;
/// Facts surviving the Stage-I relevance cut.
const MAX_SELECTED_FACTS: usize = 10;
/// Episode expansion may consume this share of the token budget.
const EPISODE_BUDGET_SHARE: f64 = 0.4;
/// Flat token cost charged per theme header.
const THEME_TOKEN_FLAT: usize = 15;

const STAGE2_SYSTEM_PROMPT: &str =
  "You judge whether a set of retrieved facts is sufficient to answer a question.";

/// Stage-II sufficiency verdict. Anything the model says that is not a
/// clear YES or NO is treated as PARTIAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum StageTwoDecision {
  Yes,
  Partial,
  No,
}

/// The budgeted context bundle a retrieval produces.
#[derive(Debug, Clone)]
pub struct RetrievalBundle {
  pub themes: Vec<ThemeRecord>,
  pub semantics: Vec<(SemanticRecord, f32)>,
  pub episodes: Vec<EpisodeRecord>,
  pub decision: StageTwoDecision,
  pub estimated_tokens: usize,
  /// k-NN neighbours of the selected themes, recorded but not expanded.
  pub neighbor_theme_ids: Vec<String>,
}

/// Two-stage top-down retriever: breadth over themes and facts, then
/// LLM-gated depth into episode summaries.
pub struct Retriever {
  /// Coverage/relevance balance for greedy theme selection, tuned by the
  /// feedback loop within [0.2, 0.8].
  pub alpha: f32,
  pub token_budget: usize,
  pub policy: DecayPolicy,
}

impl Retriever {
  pub fn new(alpha: f32, token_budget: usize) -> Self {
    Self {
      alpha,
      token_budget,
      policy: DecayPolicy::default(),
    }
  }

  pub async fn retrieve(
    &self,
    query: &str,
    query_vec: &[f32],
    model: &dyn TextModel,
    store: &dyn VectorStore,
    now_ms: i64,
  ) -> Result<RetrievalBundle> {
    // ── Stage I: breadth ──
    let candidates = ThemeRecord::search(store, query_vec, THEME_CANDIDATES).await?;
    let selected = self.select_themes(candidates);

    let neighbor_theme_ids: Vec<String> = {
      let selected_ids: HashSet<&str> = selected.iter().map(|t| t.id.as_str()).collect();
      let mut seen = HashSet::new();
      selected
        .iter()
        .flat_map(|t| t.neighbor_ids.iter())
        .filter(|id| !selected_ids.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect()
    };

    let mut semantics: Vec<(SemanticRecord, f32)> = Vec::new();
    for theme in &selected {
      for fact in SemanticRecord::in_theme(store, &theme.id).await? {
        let relevance = cosine_similarity(query_vec, &fact.embedding)
          * decay_weight(fact.created_at, now_ms, Some(self.policy.semantic_half_life_days))
            as f32;
        semantics.push((fact, relevance));
      }
    }
    semantics.sort_by(|a, b| b.1.total_cmp(&a.1));
    semantics.truncate(MAX_SELECTED_FACTS);

    // ── Stage II: depth ──
    if semantics.is_empty() {
      let estimated_tokens = selected.len() * THEME_TOKEN_FLAT;
      return Ok(RetrievalBundle {
        themes: selected,
        semantics,
        episodes: Vec::new(),
        decision: StageTwoDecision::No,
        estimated_tokens,
        neighbor_theme_ids,
      });
    }

    let fact_list: String = semantics
      .iter()
      .map(|(f, _)| format!("- {}\n", f.content))
      .collect();
    let question = format!(
      "Given these facts:\n{fact_list}\nCan they fully answer this question: \
       {query}\nReply with exactly one word: YES, PARTIAL, or NO."
    );
    let decision = match model.complete(STAGE2_SYSTEM_PROMPT, &question).await {
      Ok(reply) => parse_stage2(&reply),
      Err(err) if err.is_parse() => StageTwoDecision::Partial,
      Err(err) => return Err(err),
    };

    let episodes = if decision == StageTwoDecision::Yes {
      Vec::new()
    } else {
      self.expand_episodes(&semantics, store).await?
    };

    let estimated_tokens = selected.len() * THEME_TOKEN_FLAT
      + semantics
        .iter()
        .map(|(f, _)| estimate_tokens(&f.content))
        .sum::<usize>()
      + episodes
        .iter()
        .map(|e| estimate_tokens(&e.summary))
        .sum::<usize>();

    Ok(RetrievalBundle {
      themes: selected,
      semantics,
      episodes,
      decision,
      estimated_tokens,
      neighbor_theme_ids,
    })
  }

  /// Greedy submodular selection: each step takes the candidate maximising
  /// `α · coverage_gain + (1 − α) · relevance`, where coverage gain is the
  /// fraction of the candidate's facts not already covered.
  fn select_themes(&self, candidates: Vec<(ThemeRecord, f32)>) -> Vec<ThemeRecord> {
    let mut remaining = candidates;
    let mut covered: HashSet<String> = HashSet::new();
    let mut selected = Vec::new();

    while selected.len() < MAX_SELECTED_THEMES && !remaining.is_empty() {
      let (best_idx, _) = remaining
        .iter()
        .enumerate()
        .map(|(i, (theme, relevance))| {
          let total = theme.semantic_ids.len().max(1);
          let uncovered = theme
            .semantic_ids
            .iter()
            .filter(|id| !covered.contains(*id))
            .count();
          let coverage_gain = uncovered as f32 / total as f32;
          let relevance = relevance.clamp(0.0, 1.0);
          (i, self.alpha * coverage_gain + (1.0 - self.alpha) * relevance)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .expect("remaining is non-empty");

      let (theme, _) = remaining.swap_remove(best_idx);
      covered.extend(theme.semantic_ids.iter().cloned());
      selected.push(theme);
    }

    selected
  }

  /// Union the surviving facts' episode references in first-seen order and
  /// keep as many as fit in the episode share of the token budget.
  async fn expand_episodes(
    &self,
    semantics: &[(SemanticRecord, f32)],
    store: &dyn VectorStore,
  ) -> Result<Vec<EpisodeRecord>> {
    let mut seen = HashSet::new();
    let episode_ids: Vec<&str> = semantics
      .iter()
      .flat_map(|(f, _)| f.episode_ids.iter())
      .filter(|id| seen.insert(id.as_str()))
      .map(String::as_str)
      .collect();

    let budget = (self.token_budget as f64 * EPISODE_BUDGET_SHARE) as usize;
    let mut used = 0;
    let mut episodes = Vec::new();
    for id in episode_ids {
      // Decayed episodes are allowed to dangle; skip quietly.
      let Some(episode) = EpisodeRecord::find(store, id).await? else {
        continue;
      };
      let cost = estimate_tokens(&episode.summary);
      if used + cost > budget {
        continue;
      }
      used += cost;
      episodes.push(episode);
    }
    Ok(episodes)
  }
}

/// Tolerant Stage-II reply parsing: first word, case-insensitive, trailing
/// punctuation ignored. Everything unexpected is PARTIAL.
pub fn parse_stage2(reply: &str) -> StageTwoDecision {
  let first = reply
    .trim()
    .split_whitespace()
    .next()
    .unwrap_or("")
    .trim_matches(|c: char| !c.is_alphabetic())
    .to_ascii_uppercase();

  match first.as_str() {
    "YES" => StageTwoDecision::Yes,
    "NO" => StageTwoDecision::No,
    _ => StageTwoDecision::Partial,
  }
}

/// Render the bundle as the prompt-injection memory section.
pub fn render_bundle(bundle: &RetrievalBundle, now: DateTime<Utc>) -> String {
  let mut out = String::new();

  if !bundle.themes.is_empty() {
    let _ = writeln!(out, "### Topics");
    for theme in &bundle.themes {
      let _ = writeln!(out, "- {}", theme.name);
    }
  }

  if !bundle.semantics.is_empty() {
    let _ = writeln!(out, "### Known facts");
    for (fact, _) in &bundle.semantics {
      let _ = writeln!(out, "- {}", fact.content);
    }
  }

  if !bundle.episodes.is_empty() {
    let _ = writeln!(out, "### Past episodes");
    for episode in &bundle.episodes {
      let created = DateTime::<Utc>::from_timestamp_millis(episode.created_at).unwrap_or(now);
      let relative = HumanTime::from(created.signed_duration_since(now));
      let _ = writeln!(out, "- ({relative}) {}", episode.summary);
    }
  }

  out.trim_end().to_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_accepts_exact_words() {
    assert_eq!(parse_stage2("YES"), StageTwoDecision::Yes);
    assert_eq!(parse_stage2("no."), StageTwoDecision::No);
    assert_eq!(parse_stage2("  partial"), StageTwoDecision::Partial);
  }

  #[test]
  fn parse_defaults_unexpected_to_partial() {
    assert_eq!(parse_stage2(""), StageTwoDecision::Partial);
    assert_eq!(parse_stage2("It depends on the question"), StageTwoDecision::Partial);
    assert_eq!(parse_stage2("YESNO garbage"), StageTwoDecision::Partial);
  }

  #[test]
  fn greedy_selection_prefers_uncovered_facts() {
    let theme = |id: &str, ids: &[&str]| ThemeRecord {
      id: id.to_owned(),
      name: id.to_owned(),
      summary: String::new(),
      embedding: vec![1.0, 0.0],
      semantic_ids: ids.iter().map(|s| (*s).to_owned()).collect(),
      message_count: 0,
      last_active: 0,
      neighbor_ids: Vec::new(),
      dormant: false,
      created_at: 0,
    };

    let retriever = Retriever::new(0.8, 500);
    // Same relevance; the second theme duplicates the first's facts, the
    // third brings fresh ones.
    let selected = retriever.select_themes(vec![
      (theme("a", &["f1", "f2"]), 0.9),
      (theme("b", &["f1", "f2"]), 0.9),
      (theme("c", &["f3", "f4"]), 0.9),
    ]);

    assert_eq!(selected.len(), 3);
    assert_eq!(selected[0].id, "a");
    // Fresh coverage beats the duplicate even at equal relevance.
    assert_eq!(selected[1].id, "c");
  }
}
