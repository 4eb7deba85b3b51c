/// CJK unified ideographs, kana, and hangul ranges.
#[must_use]
pub const fn is_cjk(c: char) -> bool {
  matches!(c,
    '\u{3040}'..='\u{30FF}'   // hiragana + katakana
    | '\u{3400}'..='\u{4DBF}' // CJK extension A
    | '\u{4E00}'..='\u{9FFF}' // CJK unified
    | '\u{AC00}'..='\u{D7AF}' // hangul syllables
    | '\u{F900}'..='\u{FAFF}' // CJK compatibility
  )
}

/// Estimate prompt tokens: ⌈ non-CJK chars / 4 + CJK chars / 2 ⌉.
///
/// CJK characters carry roughly twice the token weight of Latin characters
/// under common tokenizers.
pub fn estimate_tokens(text: &str) -> usize {
  let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), c| {
    if is_cjk(c) {
      (cjk + 1, other)
    } else {
      (cjk, other + 1)
    }
  });
  (other as f64 / 4.0 + cjk as f64 / 2.0).ceil() as usize
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ascii_counts_quarters() {
    assert_eq!(estimate_tokens("abcdefgh"), 2);
  }

  #[test]
  fn cjk_counts_halves() {
    assert_eq!(estimate_tokens("记忆引擎"), 2);
  }

  #[test]
  fn mixed_text_rounds_up() {
    // 3 ascii / 4 + 1 cjk / 2 = 1.25 → 2
    assert_eq!(estimate_tokens("abc记"), 2);
  }

  #[test]
  fn empty_is_zero() {
    assert_eq!(estimate_tokens(""), 0);
  }
}
