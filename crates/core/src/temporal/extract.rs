use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use stratamem_ai::{TextModel, complete_structured};

use crate::decay::DAY_MS;

/// When an event happened and for how long, as opposed to when it was
/// discussed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticTime {
  pub time: i64,
  pub duration_ms: i64,
}

static ISO_DATE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date compiles"));

static CHINESE_DATE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(\d{4})年(\d{1,2})月(\d{1,2})日").expect("cn date compiles"));

const EXTRACT_SYSTEM_PROMPT: &str = "\
Determine when the event described below actually happened, relative to the \
reference date. If the text names no time, use the reference date with zero \
duration.";

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractedDate {
  /// Event date as YYYY-MM-DD.
  date: String,
  /// How many days the event spanned; 0 for a point event.
  duration_days: i64,
}

fn date_to_ms(year: i32, month: u32, day: u32) -> Option<i64> {
  Some(
    NaiveDate::from_ymd_opt(year, month, day)?
      .and_hms_opt(0, 0, 0)?
      .and_utc()
      .timestamp_millis(),
  )
}

/// Heuristic semantic-time extraction: absolute dates first, then the
/// common relative words, otherwise the dialogue time itself.
pub fn heuristic_semantic_time(text: &str, dialogue_time: i64) -> SemanticTime {
  if let Some(caps) = ISO_DATE.captures(text)
    && let (Ok(y), Ok(m), Ok(d)) = (caps[1].parse(), caps[2].parse(), caps[3].parse())
    && let Some(time) = date_to_ms(y, m, d)
  {
    return SemanticTime { time, duration_ms: 0 };
  }

  if let Some(caps) = CHINESE_DATE.captures(text)
    && let (Ok(y), Ok(m), Ok(d)) = (caps[1].parse(), caps[2].parse(), caps[3].parse())
    && let Some(time) = date_to_ms(y, m, d)
  {
    return SemanticTime { time, duration_ms: 0 };
  }

  let lower = text.to_lowercase();
  if lower.contains("yesterday") || lower.contains("昨天") {
    return SemanticTime {
      time: dialogue_time - DAY_MS,
      duration_ms: 0,
    };
  }
  if lower.contains("last week") || lower.contains("上周") {
    return SemanticTime {
      time: dialogue_time - 7 * DAY_MS,
      duration_ms: 7 * DAY_MS,
    };
  }

  SemanticTime {
    time: dialogue_time,
    duration_ms: 0,
  }
}

/// LLM-backed extraction with the heuristic as the fallback for every
/// failure mode: transport errors, malformed JSON, or nonsense dates.
pub async fn extract_semantic_time(
  model: &dyn TextModel,
  text: &str,
  dialogue_time: i64,
) -> SemanticTime {
  let reference = chrono::DateTime::from_timestamp_millis(dialogue_time)
    .map(|dt| dt.format("%Y-%m-%d").to_string())
    .unwrap_or_default();
  let user = format!("Reference date: {reference}\n\nEvent:\n{text}");

  match complete_structured::<ExtractedDate>(model, EXTRACT_SYSTEM_PROMPT, &user, "event_date").await
  {
    Ok(extracted) => {
      let parsed = NaiveDate::parse_from_str(&extracted.date, "%Y-%m-%d")
        .ok()
        .filter(|d| (1970..2100).contains(&chrono::Datelike::year(d)))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis());
      match parsed {
        Some(time) => SemanticTime {
          time,
          duration_ms: extracted.duration_days.max(0) * DAY_MS,
        },
        None => heuristic_semantic_time(text, dialogue_time),
      }
    }
    Err(err) => {
      tracing::debug!(error = %err, "semantic-time extraction fell back to heuristic");
      heuristic_semantic_time(text, dialogue_time)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const NOW: i64 = 1_753_000_000_000;

  #[test]
  fn iso_dates_win() {
    let st = heuristic_semantic_time("deployed on 2026-07-01 at noon", NOW);
    assert_eq!(st.time, date_to_ms(2026, 7, 1).unwrap());
    assert_eq!(st.duration_ms, 0);
  }

  #[test]
  fn chinese_absolute_dates_parse() {
    let st = heuristic_semantic_time("我们2026年7月1日上线了", NOW);
    assert_eq!(st.time, date_to_ms(2026, 7, 1).unwrap());
  }

  #[test]
  fn yesterday_shifts_one_day() {
    let st = heuristic_semantic_time("we fixed the bug yesterday", NOW);
    assert_eq!(st.time, NOW - DAY_MS);
  }

  #[test]
  fn last_week_spans_seven_days() {
    let st = heuristic_semantic_time("上周在写迁移脚本", NOW);
    assert_eq!(st.time, NOW - 7 * DAY_MS);
    assert_eq!(st.duration_ms, 7 * DAY_MS);
  }

  #[test]
  fn plain_text_falls_back_to_dialogue_time() {
    let st = heuristic_semantic_time("we talked about error handling", NOW);
    assert_eq!(st.time, NOW);
    assert_eq!(st.duration_ms, 0);
  }
}
