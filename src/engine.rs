use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use stratamem_ai::{
  EmbedTask, Embedder, JinaEmbedder, OpenAiTextModel, TextModel, VECTOR_DIM,
};
use stratamem_core::{
  BudgetItem, BudgetTier, Compactor, CompactionStrategy, DecisionContext, EpisodeBuilder,
  FeedbackTuner, HostTools, Observability, ObservabilityReport, PreloadRule, RetrievalTrace,
  Retriever, Satisfaction, TemporalEvent, TemporalLayer, ThemeManager, allocate,
  assess_uncertainty, build_preload_rules, decay_sweep, decide, dedup_sweep, execute,
  extract_facts, extract_semantic_time, parse_query, preload_hint, rebuild_profile,
  render_bundle, rerank_episodes, run_chain, sparsity_score,
};
use stratamem_shared::{APP_ENV, MemoryError, Message, Result};
use stratamem_store::{
  EpisodeRecord, MemStore, Table, ThemeRecord, UserProfileRecord, VectorStore, init_table,
};

use crate::config::MemoryConfig;

/// Prompts shorter than this never engage retrieval.
const MIN_PROMPT_CHARS: usize = 4;

/// Queries remembered for repeated-question detection.
const RECENT_QUERY_CAP: usize = 3;

const FACT_PREVIEW_CHARS: usize = 80;

/// Importance assigned to web-verified facts stored through the host.
const VERIFIED_FACT_IMPORTANCE: f32 = 0.8;

const DURATIVE_HINT_LIMIT: usize = 3;

/// The optional system-prompt injection returned by
/// [`MemoryEngine::before_prompt_build`].
#[derive(Debug, Clone)]
pub struct PromptInjection {
  pub system_prompt: String,
  pub tokens: usize,
}

struct Services {
  store: Arc<dyn VectorStore>,
  embedder: Arc<dyn Embedder>,
  model: Arc<dyn TextModel>,
}

/// Per-process mutable state, written only from the hook path.
struct EngineState {
  builders: HashMap<String, EpisodeBuilder>,
  temporal: TemporalLayer,
  observability: Observability,
  tuner: FeedbackTuner,
  themes: ThemeManager,
  preload_rules: Vec<PreloadRule>,
  recent_queries: VecDeque<String>,
  warned: HashSet<&'static str>,
}

/// The engine handle the host passes into its hooks.
///
/// All four hooks catch every error at their top level: failures are
/// logged with source context and degrade to a smaller (or absent)
/// injection, never a broken prompt. A dormant engine (no embedding
/// credentials) no-ops every hook.
pub struct MemoryEngine {
  config: MemoryConfig,
  services: Option<Services>,
  tools: HostTools,
  state: Mutex<EngineState>,
  initialized: AtomicBool,
}

impl MemoryEngine {
  /// Build an active engine from explicit ports.
  pub fn new(
    config: MemoryConfig,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn TextModel>,
    tools: HostTools,
  ) -> Self {
    let state = EngineState {
      builders: HashMap::new(),
      temporal: TemporalLayer::new(),
      observability: Observability::new(),
      tuner: FeedbackTuner::new(),
      themes: ThemeManager::new(config.max_themes),
      preload_rules: Vec::new(),
      recent_queries: VecDeque::with_capacity(RECENT_QUERY_CAP),
      warned: HashSet::new(),
    };

    Self {
      config,
      services: Some(Services {
        store,
        embedder,
        model,
      }),
      tools,
      state: Mutex::new(state),
      initialized: AtomicBool::new(false),
    }
  }

  /// An engine with no embedding credentials: every hook no-ops.
  pub fn dormant(config: MemoryConfig) -> Self {
    tracing::warn!("no embedding credentials configured; memory engine is dormant");
    let state = EngineState {
      builders: HashMap::new(),
      temporal: TemporalLayer::new(),
      observability: Observability::new(),
      tuner: FeedbackTuner::new(),
      themes: ThemeManager::new(config.max_themes),
      preload_rules: Vec::new(),
      recent_queries: VecDeque::new(),
      warned: HashSet::new(),
    };

    Self {
      config,
      services: None,
      tools: HostTools::default(),
      state: Mutex::new(state),
      initialized: AtomicBool::new(false),
    }
  }

  /// Wire the default stack: in-memory store, Jina embeddings, and an
  /// OpenAI-compatible chat model, with environment fallbacks.
  pub fn try_from_env(config: MemoryConfig, tools: HostTools) -> Result<Self> {
    let config = config.resolve_env();

    let jina_key = config
      .jina_api_key
      .clone()
      .ok_or_else(|| MemoryError::ConfigMissing("jinaApiKey / JINA_API_KEY".to_owned()))?;
    let (Some(chat_key), Some(chat_base), Some(chat_model)) = (
      APP_ENV.openai_api_key.clone(),
      APP_ENV.openai_base_url.clone(),
      APP_ENV.openai_chat_model.clone(),
    ) else {
      return Err(MemoryError::ConfigMissing(
        "OPENAI_BASE_URL / OPENAI_API_KEY / OPENAI_CHAT_MODEL".to_owned(),
      ));
    };

    let embedder = JinaEmbedder::new(&jina_key, &APP_ENV.jina_base_url, &config.jina_model);
    let model = OpenAiTextModel::new(&chat_key, &chat_base, chat_model);

    Ok(Self::new(
      config,
      Arc::new(MemStore::new()),
      Arc::new(embedder),
      Arc::new(model),
      tools,
    ))
  }

  /// Like [`Self::try_from_env`], but missing credentials yield a dormant
  /// engine (logged once) rather than an error.
  pub fn from_env(config: MemoryConfig, tools: HostTools) -> Self {
    match Self::try_from_env(config.clone(), tools) {
      Ok(engine) => engine,
      Err(err) => {
        tracing::warn!(error = %err, "memory engine starting dormant");
        Self::dormant(config.resolve_env())
      }
    }
  }

  #[must_use]
  pub fn config(&self) -> &MemoryConfig {
    &self.config
  }

  /// Aggregate retrieval metrics plus the current theme sparsity score.
  pub async fn observability_report(&self) -> ObservabilityReport {
    self.state.lock().await.observability.report()
  }

  pub async fn sparsity(&self) -> Result<f64> {
    let Some(services) = &self.services else {
      return Ok(0.0);
    };
    let themes = ThemeRecord::load_all(services.store.as_ref()).await?;
    Ok(sparsity_score(&themes))
  }

  // ──────────────────────────────────────────────────
  // Hook surface
  // ──────────────────────────────────────────────────

  /// Build the optional memory injection for the upcoming prompt.
  pub async fn before_prompt_build(
    &self,
    prompt: &str,
    cancel: &CancellationToken,
  ) -> Option<PromptInjection> {
    match self.try_before_prompt_build(prompt, cancel).await {
      Ok(injection) => injection,
      Err(err) => {
        self.swallow("before_prompt_build", err).await;
        None
      }
    }
  }

  /// Offer a compacted replacement for a tool result about to re-enter the
  /// prompt. `None` means keep the original.
  pub async fn tool_result_persist(
    &self,
    tool_name: &str,
    result: &str,
    cancel: &CancellationToken,
  ) -> Option<String> {
    if !self.config.enabled || cancel.is_cancelled() {
      return None;
    }
    let services = self.services.as_ref()?;

    let compacted = Compactor
      .compact(tool_name, result, Some(services.model.as_ref()))
      .await;
    match compacted.strategy {
      CompactionStrategy::Passthrough => None,
      _ => Some(compacted.text),
    }
  }

  /// Fold the finished turn into the hierarchy, then run active retrieval
  /// and the autonomous memory-edit pass.
  pub async fn agent_end(&self, messages: &[Message], cancel: &CancellationToken) {
    if let Err(err) = self.try_agent_end(messages, cancel).await {
      self.swallow("agent_end", err).await;
    }
  }

  /// Weekly maintenance: decay, dedup, profile rebuild, tuning, preload.
  pub async fn cron_weekly(&self, cancel: &CancellationToken) {
    if let Err(err) = self.try_cron_weekly(cancel).await {
      self.swallow("cron_weekly", err).await;
    }
  }

  // ──────────────────────────────────────────────────
  // Hook bodies
  // ──────────────────────────────────────────────────

  async fn try_before_prompt_build(
    &self,
    prompt: &str,
    cancel: &CancellationToken,
  ) -> Result<Option<PromptInjection>> {
    if !self.config.enabled {
      return Ok(None);
    }
    let Some(services) = &self.services else {
      return Ok(None);
    };
    if prompt.chars().count() < MIN_PROMPT_CHARS {
      return Ok(None);
    }
    self.ensure_init(services).await?;
    if cancel.is_cancelled() {
      return Ok(None);
    }

    let now = Utc::now();
    let now_ms = now.timestamp_millis();
    let store = services.store.as_ref();

    let query_vec = services.embedder.embed(prompt, EmbedTask::Query).await?;
    if cancel.is_cancelled() {
      return Ok(None);
    }

    let mut state = self.state.lock().await;

    let mut retriever = Retriever::new(state.tuner.alpha(), self.config.token_budget);
    retriever.policy = self.config.decay_policy();
    let mut bundle = retriever
      .retrieve(prompt, &query_vec, services.model.as_ref(), store, now_ms)
      .await?;

    let temporal_range = parse_query(prompt, now);
    if let Some(range) = &temporal_range {
      let events: Vec<TemporalEvent> = state.temporal.events().cloned().collect();
      bundle.episodes = rerank_episodes(std::mem::take(&mut bundle.episodes), &events, range)
        .into_iter()
        .map(|(episode, _)| episode)
        .collect();
    }

    // ── assemble the injection under the token budget ──
    let mut items = Vec::new();

    if let Some(profile) = UserProfileRecord::latest(store, &self.config.agent_id).await?
      && !profile.global_text.is_empty()
    {
      items.push(BudgetItem::new(
        BudgetTier::Identity,
        "profile",
        format!("### About the user\n{}", profile.global_text),
      ));
    }

    let rendered_bundle = render_bundle(&bundle, now);
    if !rendered_bundle.is_empty() {
      items.push(BudgetItem::new(BudgetTier::Memory, "memory", rendered_bundle));
    }

    if let Some(range) = &temporal_range {
      let spans: Vec<String> = state
        .temporal
        .durative()
        .iter()
        .filter(|d| d.start_time <= range.end && d.end_time >= range.start)
        .take(DURATIVE_HINT_LIMIT)
        .map(|d| format!("- {}", d.summary))
        .collect();
      if !spans.is_empty() {
        items.push(BudgetItem::new(
          BudgetTier::Extras,
          "durative",
          format!("### Ongoing periods\n{}", spans.join("\n")),
        ));
      }
    }

    if let Some(rule) = preload_hint(&state.preload_rules, now) {
      let mut names = Vec::new();
      for theme_id in &rule.theme_ids {
        if let Some(theme) = ThemeRecord::find(store, theme_id).await? {
          names.push(format!("- {}", theme.name));
        }
      }
      if !names.is_empty() {
        items.push(BudgetItem::new(
          BudgetTier::Extras,
          "preload",
          format!("### Topics usually active now\n{}", names.join("\n")),
        ));
      }
    }

    let report = allocate(items, self.config.global_token_budget);
    let rendered = report.render();

    state.observability.record(RetrievalTrace {
      query: prompt.to_owned(),
      timestamp: now_ms,
      matched_themes: bundle.themes.iter().map(|t| t.name.clone()).collect(),
      fact_previews: bundle
        .semantics
        .iter()
        .map(|(fact, _)| fact.content.chars().take(FACT_PREVIEW_CHARS).collect())
        .collect(),
      expanded_episode_ids: bundle.episodes.iter().map(|e| e.id.clone()).collect(),
      decision: bundle.decision,
      tokens_injected: report.total_used,
      satisfaction: Satisfaction::Unknown,
      agent_id: self.config.agent_id.clone(),
    });

    if state.recent_queries.len() == RECENT_QUERY_CAP {
      state.recent_queries.pop_front();
    }
    state.recent_queries.push_back(prompt.to_owned());

    if rendered.is_empty() {
      return Ok(None);
    }
    Ok(Some(PromptInjection {
      system_prompt: format!("## Long-term memory\n\n{rendered}"),
      tokens: report.total_used,
    }))
  }

  async fn try_agent_end(&self, messages: &[Message], cancel: &CancellationToken) -> Result<()> {
    if !self.config.enabled {
      return Ok(());
    }
    let Some(services) = &self.services else {
      return Ok(());
    };
    self.ensure_init(services).await?;

    let store = services.store.as_ref();
    let model = services.model.as_ref();
    let embedder = services.embedder.as_ref();
    let now_ms = Utc::now().timestamp_millis();

    let mut state = self.state.lock().await;
    let EngineState {
      builders,
      temporal,
      themes,
      recent_queries,
      warned,
      ..
    } = &mut *state;

    let builder = builders
      .entry(self.config.agent_id.clone())
      .or_insert_with(|| {
        EpisodeBuilder::new(self.config.agent_id.clone(), self.config.episode_batch_size)
      });

    for message in messages {
      // Committed work stays; the unflushed buffer survives for next turn.
      if cancel.is_cancelled() {
        return Ok(());
      }
      if !builder.add(message.clone()) {
        continue;
      }

      let Some(episode) = builder.flush(model, embedder, store).await? else {
        continue;
      };

      let facts = extract_facts(&episode, model, embedder, store).await?;
      for fact in facts {
        themes.assign(fact, model, store, now_ms).await?;
      }

      let semantic_time = extract_semantic_time(model, &episode.summary, episode.created_at).await;
      temporal.record_event(TemporalEvent {
        id: episode.id.clone(),
        content: episode.summary.clone(),
        semantic_time: semantic_time.time,
        dialogue_time: episode.created_at,
        duration_ms: semantic_time.duration_ms,
        episode_id: episode.id.clone(),
        embedding: episode.embedding.clone(),
      });
      temporal.rebuild_durative();

      themes.merge_pass(store, now_ms).await?;
      themes.rebuild_knn(store).await?;
    }

    if cancel.is_cancelled() {
      return Ok(());
    }

    // ── active retrieval + autonomous memory edits on the last exchange ──
    let question = messages.iter().rev().find(|m| m.is_user());
    let answer = messages.iter().rev().find(|m| m.is_assistant());
    let (Some(question), Some(answer)) = (question, answer) else {
      return Ok(());
    };

    let recent: Vec<String> = recent_queries.iter().cloned().collect();
    let signal = assess_uncertainty(&answer.content, &question.content, &recent);

    if let Some(result) = run_chain(&signal, &question.content, &answer.content, &self.tools).await?
      && result.verified
      && !result.proposed_facts.is_empty()
    {
      match &self.tools.memory_store {
        Some(store_cb) => {
          for fact in &result.proposed_facts {
            if let Err(err) =
              store_cb(fact.clone(), "verified".to_owned(), VERIFIED_FACT_IMPORTANCE).await
            {
              tracing::warn!(error = %err, "storing verified fact failed");
            }
          }
        }
        None => warn_once(warned, "agent_end:memory_store"),
      }
    }

    let memories = match &self.tools.memory_recall {
      Some(recall) => recall(question.content.clone()).await.unwrap_or_default(),
      None => {
        warn_once(warned, "agent_end:memory_recall");
        Vec::new()
      }
    };

    let decisions = decide(&DecisionContext {
      query: &question.content,
      output: &answer.content,
      memories: &memories,
    });
    if !decisions.is_empty() {
      let report = execute(&decisions, &self.tools).await;
      tracing::debug!(
        decisions = decisions.len(),
        applied = report.applied,
        failed = report.failed,
        skipped = report.skipped,
        "memory toolkit pass finished"
      );
    }

    Ok(())
  }

  async fn try_cron_weekly(&self, cancel: &CancellationToken) -> Result<()> {
    if !self.config.enabled {
      return Ok(());
    }
    let Some(services) = &self.services else {
      return Ok(());
    };
    self.ensure_init(services).await?;

    let store = services.store.as_ref();
    let now = Utc::now();

    decay_sweep(store, &self.config.decay_policy(), now.timestamp_millis()).await?;
    if cancel.is_cancelled() {
      return Ok(());
    }

    dedup_sweep(store).await?;
    if cancel.is_cancelled() {
      return Ok(());
    }

    rebuild_profile(
      &self.config.agent_id,
      services.model.as_ref(),
      services.embedder.as_ref(),
      store,
      now,
    )
    .await?;

    let episodes = EpisodeRecord::load_all(store).await?;
    let themes = ThemeRecord::load_all(store).await?;

    let mut state = self.state.lock().await;
    let traces = state.observability.traces();
    let alpha = state.tuner.adjust(&traces);
    state.preload_rules = build_preload_rules(&episodes, &themes);

    tracing::info!(
      alpha,
      preload_rules = state.preload_rules.len(),
      "weekly maintenance finished"
    );
    Ok(())
  }

  // ──────────────────────────────────────────────────
  // Plumbing
  // ──────────────────────────────────────────────────

  /// First-use (and post-failure) lazy store initialisation.
  async fn ensure_init(&self, services: &Services) -> Result<()> {
    if self.initialized.load(Ordering::Acquire) {
      return Ok(());
    }
    for table in Table::ALL {
      init_table(services.store.as_ref(), table, VECTOR_DIM)
        .await
        .map_err(|err| MemoryError::FatalInit(err.into()))?;
    }
    self.initialized.store(true, Ordering::Release);
    Ok(())
  }

  async fn swallow(&self, hook: &'static str, err: MemoryError) {
    if matches!(err, MemoryError::FatalInit(_)) {
      // Re-try initialisation lazily on the next hook invocation.
      self.initialized.store(false, Ordering::Release);
    }
    tracing::warn!(hook, error = %err, "hook error swallowed");
    self.state.lock().await.observability.note_swallowed();
  }
}

fn warn_once(warned: &mut HashSet<&'static str>, key: &'static str) {
  if warned.insert(key) {
    tracing::warn!(feature = key, "host callback missing; feature disabled");
  }
}
