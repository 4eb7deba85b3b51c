mod host;
pub use host::{
  ForgetFn, HostTools, LlmFn, RecallFn, SearchFn, StoreFn, forget_fn, llm_fn, search_fn,
  store_fn,
};

mod episode;
pub use episode::{EpisodeBuilder, is_topic_switch};

mod semantic;
pub use semantic::{DEDUPE_THRESHOLD, extract_facts};

mod theme;
pub use theme::{
  AssignOutcome, KNN_K, MAX_SEMANTICS_PER_THEME, MIN_SEMANTICS_PER_THEME, TailSampler,
  ThemeManager, sparsity_score,
};

mod retrieval;
pub use retrieval::{RetrievalBundle, Retriever, StageTwoDecision, parse_stage2, render_bundle};

mod active;
pub use active::{
  RetrievalSource, UncertaintyLevel, UncertaintySignal, VerifiedRetrieval, assess_uncertainty,
  cross_verify, key_terms, run_chain,
};

mod toolkit;
pub use toolkit::{DecisionContext, ExecutionReport, MemoryDecision, decide, execute};

mod temporal;
pub use temporal::{
  DurativeMemory, SemanticTime, TemporalEvent, TemporalLayer, TemporalRange,
  extract_semantic_time, heuristic_semantic_time, parse_query, rerank_episodes,
};

mod budget;
pub use budget::{AllocatedItem, BudgetItem, BudgetReport, BudgetTier, TierAllocation, allocate};

mod compactor;
pub use compactor::{CompactionResult, CompactionStrategy, Compactor};

mod decay;
pub use decay::{DAY_MS, DecayPolicy, DecayReport, decay_sweep, decay_weight};

mod feedback;
pub use feedback::FeedbackTuner;

mod preload;
pub use preload::{PreloadRule, build_preload_rules, preload_hint};

mod observe;
pub use observe::{Observability, ObservabilityReport, RetrievalTrace, Satisfaction};

mod profile;
pub use profile::rebuild_profile;

mod dedup;
pub use dedup::dedup_sweep;
