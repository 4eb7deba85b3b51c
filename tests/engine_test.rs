mod common;

use common::engine_with;
use stratamem::{Message, MessageRole, Table, VectorStore};
use stratamem_core::HostTools;
use stratamem_store::{SemanticRecord, ThemeRecord};
use tokio_util::sync::CancellationToken;

fn turn(role: MessageRole, content: &str) -> Message {
  Message::new(role, content)
}

fn trip_conversation() -> Vec<Message> {
  vec![
    turn(MessageRole::User, "I am planning a trip to Japan in October"),
    turn(MessageRole::Assistant, "October is a great time to visit Japan"),
    turn(MessageRole::User, "I want to spend most of the time in Kyoto"),
    turn(MessageRole::Assistant, "Kyoto has plenty of temples worth seeing"),
    turn(MessageRole::User, "Book me a reminder to compare flight prices"),
  ]
}

#[tokio::test]
async fn first_run_builds_one_episode_fact_and_theme() {
  let (engine, store) = engine_with("PARTIAL", HostTools::default());
  let cancel = CancellationToken::new();

  // Empty store: nothing to inject, but the prompt is long enough to engage.
  assert!(engine.before_prompt_build("hello", &cancel).await.is_none());

  engine.agent_end(&trip_conversation(), &cancel).await;

  assert_eq!(store.count(Table::Episodes).await.unwrap(), 1);
  assert!(store.count(Table::Semantics).await.unwrap() >= 1);
  assert_eq!(store.count(Table::Themes).await.unwrap(), 1);
}

#[tokio::test]
async fn prompts_under_four_chars_never_engage() {
  let (engine, store) = engine_with("PARTIAL", HostTools::default());
  let cancel = CancellationToken::new();

  assert!(engine.before_prompt_build("hi", &cancel).await.is_none());
  assert_eq!(store.count(Table::Themes).await.unwrap(), 0);
  // No trace is recorded for a prompt that never engaged.
  assert_eq!(engine.observability_report().await.traces, 0);
}

#[tokio::test]
async fn semantic_theme_links_stay_inverse_of_each_other() {
  let (engine, store) = engine_with("PARTIAL", HostTools::default());
  let cancel = CancellationToken::new();

  engine.agent_end(&trip_conversation(), &cancel).await;

  let themes = ThemeRecord::load_all(store.as_ref()).await.unwrap();
  let rows = store.scan_all(Table::Semantics).await.unwrap();
  for row in &rows {
    let fact = SemanticRecord::from_row(row).unwrap();
    let theme = themes
      .iter()
      .find(|t| t.id == fact.theme_id)
      .expect("owning theme exists");
    assert!(theme.semantic_ids.contains(&fact.id));
  }
  for theme in &themes {
    for id in &theme.semantic_ids {
      let fact = SemanticRecord::find(store.as_ref(), id).await.unwrap().unwrap();
      assert_eq!(fact.theme_id, theme.id);
    }
  }
}

#[tokio::test]
async fn stage_two_yes_returns_facts_without_episodes() {
  let (engine, _store) = engine_with("YES", HostTools::default());
  let cancel = CancellationToken::new();

  engine.agent_end(&trip_conversation(), &cancel).await;

  let injection = engine
    .before_prompt_build("trip to Japan planning", &cancel)
    .await
    .expect("facts were stored, injection expected");
  assert!(injection.system_prompt.contains("Known facts"));
  assert!(!injection.system_prompt.contains("Past episodes"));
  assert!(injection.tokens > 0);
}

#[tokio::test]
async fn stage_two_partial_expands_episodes_referenced_by_facts() {
  let (engine, store) = engine_with("PARTIAL", HostTools::default());
  let cancel = CancellationToken::new();

  engine.agent_end(&trip_conversation(), &cancel).await;

  let injection = engine
    .before_prompt_build("trip to Japan planning", &cancel)
    .await
    .expect("injection expected");
  assert!(injection.system_prompt.contains("Past episodes"));

  // Every expanded episode is referenced by at least one stored fact.
  let episode_rows = store.scan_all(Table::Episodes).await.unwrap();
  let fact_rows = store.scan_all(Table::Semantics).await.unwrap();
  for row in &episode_rows {
    let referenced = fact_rows.iter().any(|f| {
      SemanticRecord::from_row(f)
        .unwrap()
        .episode_ids
        .contains(&row.id)
    });
    assert!(referenced);
  }
}

#[tokio::test]
async fn injection_stays_within_the_global_token_budget() {
  let (engine, _store) = engine_with("PARTIAL", HostTools::default());
  let cancel = CancellationToken::new();

  engine.agent_end(&trip_conversation(), &cancel).await;
  let injection = engine
    .before_prompt_build("trip to Japan planning", &cancel)
    .await
    .expect("injection expected");
  assert!(injection.tokens <= engine.config().global_token_budget);
}

#[tokio::test]
async fn short_tool_results_pass_through_untouched() {
  let (engine, _store) = engine_with("PARTIAL", HostTools::default());
  let cancel = CancellationToken::new();

  let replacement = engine
    .tool_result_persist("shell", "exit code 0", &cancel)
    .await;
  assert!(replacement.is_none());
}

#[tokio::test]
async fn oversized_tool_results_come_back_compacted() {
  let (engine, _store) = engine_with("PARTIAL", HostTools::default());
  let cancel = CancellationToken::new();

  let noisy = "<div>chunk of scraped page content</div>\n".repeat(40);
  let replacement = engine
    .tool_result_persist("fetch", &noisy, &cancel)
    .await
    .expect("large noisy output should be rewritten");
  assert!(!replacement.contains("<div>"));
}

#[tokio::test]
async fn cron_weekly_runs_cleanly_on_a_populated_store() {
  let (engine, store) = engine_with("PARTIAL", HostTools::default());
  let cancel = CancellationToken::new();

  engine.agent_end(&trip_conversation(), &cancel).await;
  engine.cron_weekly(&cancel).await;

  // Fresh data survives the sweep; the profile rebuild ran.
  assert_eq!(store.count(Table::Episodes).await.unwrap(), 1);
  assert_eq!(store.count(Table::UserProfile).await.unwrap(), 1);
  assert_eq!(engine.observability_report().await.swallowed_failures, 0);
}

#[tokio::test]
async fn rapid_requery_rates_the_previous_trace_unsatisfied() {
  let (engine, _store) = engine_with("PARTIAL", HostTools::default());
  let cancel = CancellationToken::new();

  engine.agent_end(&trip_conversation(), &cancel).await;
  engine.before_prompt_build("trip to Japan planning", &cancel).await;
  engine.before_prompt_build("trip to Japan planning again", &cancel).await;

  let report = engine.observability_report().await;
  assert_eq!(report.traces, 2);
  // Both queries hit; the second arrived within the 60s window.
  assert!(report.hit_rate > 0.99);
  assert!(report.satisfaction_rate < 0.01);
}
