use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, Utc};
use regex::Regex;

use crate::decay::DAY_MS;

/// The time window a temporal query asks about, in epoch milliseconds.
/// `end` is always ≥ `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalRange {
  pub start: i64,
  pub end: i64,
  /// The expression that matched, for tracing.
  pub expression: String,
}

static DAYS_AGO: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(\d+)\s*(?:days?\s+ago|天前)").expect("days-ago compiles"));

fn midnight(now: DateTime<Utc>) -> i64 {
  now
    .date_naive()
    .and_hms_opt(0, 0, 0)
    .expect("midnight exists")
    .and_utc()
    .timestamp_millis()
}

/// Midnight starting the current (Monday-based) week.
fn week_start(now: DateTime<Utc>) -> i64 {
  let days_from_monday = now.weekday().num_days_from_monday() as i64;
  midnight(now) - days_from_monday * DAY_MS
}

fn month_start(now: DateTime<Utc>) -> i64 {
  now
    .date_naive()
    .with_day(1)
    .expect("day 1 exists")
    .and_hms_opt(0, 0, 0)
    .expect("midnight exists")
    .and_utc()
    .timestamp_millis()
}

fn previous_month_start(now: DateTime<Utc>) -> i64 {
  let first = now.date_naive().with_day(1).expect("day 1 exists");
  let prev = first - Duration::days(1);
  prev
    .with_day(1)
    .expect("day 1 exists")
    .and_hms_opt(0, 0, 0)
    .expect("midnight exists")
    .and_utc()
    .timestamp_millis()
}

/// Map relative temporal expressions in a query to a concrete window
/// around `now`. Non-temporal queries return `None`.
pub fn parse_query(query: &str, now: DateTime<Utc>) -> Option<TemporalRange> {
  let lower = query.to_lowercase();
  let now_ms = now.timestamp_millis();
  let today = midnight(now);

  let range = |start: i64, end: i64, expression: &str| {
    Some(TemporalRange {
      start,
      end: end.max(start),
      expression: expression.to_owned(),
    })
  };

  if lower.contains("yesterday") || lower.contains("昨天") {
    return range(today - DAY_MS, today, "yesterday");
  }
  if lower.contains("today") || lower.contains("今天") {
    return range(today, now_ms, "today");
  }
  if let Some(caps) = DAYS_AGO.captures(&lower) {
    let n: i64 = caps[1].parse().ok()?;
    let day = today - n * DAY_MS;
    return range(day, day + DAY_MS, "days ago");
  }
  if lower.contains("last week") || lower.contains("上周") || lower.contains("上星期") {
    let this_week = week_start(now);
    return range(this_week - 7 * DAY_MS, this_week, "last week");
  }
  if lower.contains("this week") || lower.contains("本周") || lower.contains("这周") {
    return range(week_start(now), now_ms, "this week");
  }
  if lower.contains("last month") || lower.contains("上个月") {
    return range(previous_month_start(now), month_start(now), "last month");
  }
  if lower.contains("recently") || lower.contains("lately") || lower.contains("最近") {
    return range(now_ms - 7 * DAY_MS, now_ms, "recently");
  }

  None
}
