use std::collections::HashSet;

fn flush_word(word: &mut String, tokens: &mut Vec<String>) {
  if word.is_empty() {
    return;
  }
  // Sentence punctuation glues to the last word; interior dots (3.12) stay.
  let trimmed = word.trim_matches('.');
  if !trimmed.is_empty() {
    tokens.push(trimmed.to_owned());
  }
  word.clear();
}

/// Split text into comparison tokens: lowercased alphanumeric runs (keeping
/// `$` and interior dots so prices and versions survive), plus one token per
/// CJK character, since CJK has no whitespace word boundaries.
pub fn tokenize(text: &str) -> Vec<String> {
  let mut tokens = Vec::new();
  let mut word = String::new();

  for c in text.chars() {
    if crate::tokens::is_cjk(c) {
      flush_word(&mut word, &mut tokens);
      tokens.push(c.to_string());
    } else if c.is_alphanumeric() || c == '$' || c == '.' {
      word.extend(c.to_lowercase());
    } else {
      flush_word(&mut word, &mut tokens);
    }
  }
  flush_word(&mut word, &mut tokens);
  tokens
}

/// Number of distinct tokens shared between two texts.
pub fn shared_token_count(a: &str, b: &str) -> usize {
  let set_a: HashSet<String> = tokenize(a).into_iter().collect();
  let set_b: HashSet<String> = tokenize(b).into_iter().collect();
  set_a.intersection(&set_b).count()
}

/// Fraction of `a`'s distinct tokens that also appear in `b`, in [0, 1].
pub fn overlap_ratio(a: &str, b: &str) -> f32 {
  let set_a: HashSet<String> = tokenize(a).into_iter().collect();
  if set_a.is_empty() {
    return 0.0;
  }
  let set_b: HashSet<String> = tokenize(b).into_iter().collect();
  let shared = set_a.intersection(&set_b).count();
  shared as f32 / set_a.len() as f32
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tokenizes_mixed_scripts() {
    let tokens = tokenize("price is $50 产品");
    assert!(tokens.contains(&"$50".to_owned()));
    assert!(tokens.contains(&"产".to_owned()));
    assert!(tokens.contains(&"品".to_owned()));
  }

  #[test]
  fn sentence_period_does_not_stick() {
    assert_eq!(tokenize("version 3.12 shipped."), vec!["version", "3.12", "shipped"]);
  }

  #[test]
  fn full_overlap_is_one() {
    assert!((overlap_ratio("the same words", "the same words.") - 1.0).abs() < 1e-6);
  }

  #[test]
  fn disjoint_overlap_is_zero() {
    assert_eq!(overlap_ratio("alpha beta", "gamma delta"), 0.0);
  }

  #[test]
  fn shared_tokens_counted_once() {
    assert_eq!(shared_token_count("rust rust tokio", "rust tokio axum"), 2);
  }
}
