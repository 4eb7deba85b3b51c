use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use stratamem_ai::TextModel;
use stratamem_shared::estimate_tokens;

/// Size ladder, in estimated tokens.
pub const STRIP_THRESHOLD: usize = 200;
pub const TRUNCATE_THRESHOLD: usize = 500;
pub const SEMANTIC_THRESHOLD: usize = 800;
pub const SUMMARIZE_THRESHOLD: usize = 1_500;

/// Target size for truncated output.
const TRUNCATE_TARGET_TOKENS: usize = 400;

/// Head/tail context handed to the summariser for very large outputs.
const SUMMARIZE_CONTEXT_CHARS: usize = 1_500;

const MAX_BUCKET_LINES: usize = 5;

const SUMMARIZE_SYSTEM_PROMPT: &str = "\
Compress the tool output below. Preserve every number, identifier, error \
message, and conclusion; drop boilerplate and repetition. Output plain \
text.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CompactionStrategy {
  Passthrough,
  Strip,
  Truncate,
  Semantic,
  Summarize,
}

#[derive(Debug, Clone)]
pub struct CompactionResult {
  pub strategy: CompactionStrategy,
  pub text: String,
  pub original_tokens: usize,
  pub final_tokens: usize,
}

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("compiles"));
static IMAGE_SYNTAX: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("compiles"));
static NOISE_LINE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?im)^.*(advertisement|sponsored|cookie consent|subscribe now|sign up for|newsletter).*$")
    .expect("compiles")
});
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("compiles"));
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("compiles"));

static NUMBER_LINE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\d").expect("compiles"));
static ACTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\b(created|updated|deleted|failed|error|warning|success|started|finished|installed)\b")
    .expect("compiles")
});
static ENTITY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]+)+\b|\b[a-z0-9_]+\.[a-z0-9_.]+\b")
    .expect("compiles")
});
static KEY_VALUE_LINE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[\w .-]{1,40}[:=]\s*\S").expect("compiles"));

/// Compresses individual tool outputs before they re-enter the prompt.
///
/// Strategy is chosen by a size ladder; the LLM is only consulted for the
/// largest outputs, and its failure falls back to truncation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Compactor;

impl Compactor {
  pub async fn compact(
    &self,
    tool_name: &str,
    output: &str,
    model: Option<&dyn TextModel>,
  ) -> CompactionResult {
    let original_tokens = estimate_tokens(output);

    let (strategy, text) = if original_tokens <= STRIP_THRESHOLD {
      (CompactionStrategy::Passthrough, output.to_owned())
    } else if original_tokens <= TRUNCATE_THRESHOLD {
      (CompactionStrategy::Strip, strip_noise(output))
    } else if original_tokens <= SEMANTIC_THRESHOLD {
      (
        CompactionStrategy::Truncate,
        truncate_lines(&strip_noise(output), TRUNCATE_TARGET_TOKENS),
      )
    } else if original_tokens <= SUMMARIZE_THRESHOLD {
      let stripped = strip_noise(output);
      let truncated = truncate_lines(&stripped, TRUNCATE_TARGET_TOKENS);
      let semantic = semantic_extract(&stripped);
      if !semantic.is_empty() && estimate_tokens(&semantic) < estimate_tokens(&truncated) {
        (CompactionStrategy::Semantic, semantic)
      } else {
        (CompactionStrategy::Truncate, truncated)
      }
    } else {
      match summarize(output, model).await {
        Some(summary) => (CompactionStrategy::Summarize, summary),
        None => (
          CompactionStrategy::Truncate,
          truncate_lines(&strip_noise(output), TRUNCATE_TARGET_TOKENS),
        ),
      }
    };

    let final_tokens = estimate_tokens(&text);
    tracing::debug!(
      tool = tool_name,
      strategy = %strategy,
      original_tokens,
      final_tokens,
      "tool output compacted"
    );

    CompactionResult {
      strategy,
      text,
      original_tokens,
      final_tokens,
    }
  }
}

/// Drop HTML tags, image syntax, and ad/navigation noise; collapse runs of
/// whitespace.
fn strip_noise(text: &str) -> String {
  let text = HTML_TAG.replace_all(text, " ");
  let text = IMAGE_SYNTAX.replace_all(&text, "");
  let text = NOISE_LINE.replace_all(&text, "");
  let text = SPACE_RUNS.replace_all(&text, " ");
  let text = BLANK_RUNS.replace_all(&text, "\n\n");
  text.trim().to_owned()
}

/// Keep whole lines until the target, then a visible omission marker.
fn truncate_lines(text: &str, max_tokens: usize) -> String {
  let mut kept: Vec<&str> = Vec::new();
  let mut used = 0;
  let mut omitted = 0;

  for line in text.lines() {
    let cost = estimate_tokens(line);
    if used + cost > max_tokens {
      omitted += cost;
      continue;
    }
    used += cost;
    kept.push(line);
  }

  if omitted == 0 {
    return kept.join("\n");
  }
  format!("{}\n[truncated, {omitted} tokens omitted]", kept.join("\n"))
}

/// Regex-extract key facts, entities, actions, and numbers into a
/// structured summary.
fn semantic_extract(text: &str) -> String {
  let mut facts: Vec<&str> = Vec::new();
  let mut actions: Vec<&str> = Vec::new();
  let mut numbers: Vec<&str> = Vec::new();
  let mut entities: Vec<String> = Vec::new();

  for line in text.lines() {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    if KEY_VALUE_LINE.is_match(line) && facts.len() < MAX_BUCKET_LINES {
      facts.push(line);
    } else if ACTION_LINE.is_match(line) && actions.len() < MAX_BUCKET_LINES {
      actions.push(line);
    } else if NUMBER_LINE.is_match(line) && numbers.len() < MAX_BUCKET_LINES {
      numbers.push(line);
    }

    for m in ENTITY_TOKEN.find_iter(line) {
      let token = m.as_str().to_owned();
      if entities.len() < 2 * MAX_BUCKET_LINES && !entities.contains(&token) {
        entities.push(token);
      }
    }
  }

  if facts.is_empty() && actions.is_empty() && numbers.is_empty() && entities.is_empty() {
    return String::new();
  }

  let mut out = String::new();
  let section = |title: &str, lines: &[&str], out: &mut String| {
    if lines.is_empty() {
      return;
    }
    let _ = writeln!(out, "{title}:");
    for line in lines {
      let _ = writeln!(out, "- {line}");
    }
  };

  section("Key facts", &facts, &mut out);
  section("Actions", &actions, &mut out);
  section("Numbers", &numbers, &mut out);
  if !entities.is_empty() {
    let _ = writeln!(out, "Entities: {}", entities.join(", "));
  }
  out.trim_end().to_owned()
}

/// Head + tail of a huge output through the summariser. `None` when the
/// model is absent or fails.
async fn summarize(text: &str, model: Option<&dyn TextModel>) -> Option<String> {
  let model = model?;

  let chars: Vec<char> = text.chars().collect();
  let user = if chars.len() <= 2 * SUMMARIZE_CONTEXT_CHARS {
    text.to_owned()
  } else {
    let head: String = chars[..SUMMARIZE_CONTEXT_CHARS].iter().collect();
    let tail: String = chars[chars.len() - SUMMARIZE_CONTEXT_CHARS..].iter().collect();
    format!("{head}\n[...]\n{tail}")
  };

  match model.complete(SUMMARIZE_SYSTEM_PROMPT, &user).await {
    Ok(summary) if !summary.trim().is_empty() => Some(summary.trim().to_owned()),
    Ok(_) => None,
    Err(err) => {
      tracing::warn!(error = %err, "compaction summarise failed, falling back to truncate");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn small_outputs_pass_through_untouched() {
    let result = Compactor.compact("shell", "ok: 3 files changed", None).await;
    assert_eq!(result.strategy, CompactionStrategy::Passthrough);
    assert_eq!(result.text, "ok: 3 files changed");
  }

  #[tokio::test]
  async fn mid_size_outputs_get_stripped() {
    let noisy = format!(
      "<div>main content here</div>\nSubscribe now for updates!\n{}",
      "useful words ".repeat(80)
    );
    let result = Compactor.compact("fetch", &noisy, None).await;
    assert_eq!(result.strategy, CompactionStrategy::Strip);
    assert!(!result.text.contains("<div>"));
    assert!(!result.text.contains("Subscribe now"));
  }

  #[tokio::test]
  async fn truncation_leaves_a_visible_marker() {
    let lines: String = (0..55)
      .map(|i| format!("log line number {i} with some payload text here\n"))
      .collect();
    let tokens = estimate_tokens(&lines);
    assert!(tokens > TRUNCATE_THRESHOLD && tokens <= SEMANTIC_THRESHOLD);
    let result = Compactor.compact("shell", &lines, None).await;
    assert_eq!(result.strategy, CompactionStrategy::Truncate);
    assert!(result.text.contains("[truncated,"));
    assert!(result.final_tokens < result.original_tokens);
  }

  #[tokio::test]
  async fn huge_output_without_model_falls_back_to_truncate() {
    let huge = "a very long line of output with words\n".repeat(700);
    assert!(estimate_tokens(&huge) > SUMMARIZE_THRESHOLD);
    let result = Compactor.compact("fetch", &huge, None).await;
    assert_eq!(result.strategy, CompactionStrategy::Truncate);
  }

  #[test]
  fn semantic_extract_buckets_structured_lines() {
    let text = "status: green\nDeploy failed on node 3\nRetryPolicy applies to api.internal.svc\nplain prose line";
    let summary = semantic_extract(text);
    assert!(summary.contains("Key facts"));
    assert!(summary.contains("status: green"));
    assert!(summary.contains("Actions"));
    assert!(summary.contains("RetryPolicy"));
  }

  #[test]
  fn strip_collapses_blank_runs() {
    let stripped = strip_noise("a\n\n\n\n\nb");
    assert_eq!(stripped, "a\n\nb");
  }
}
