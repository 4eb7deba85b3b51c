use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

pub type LlmFn = Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;
pub type RecallFn =
  Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<Vec<String>>> + Send + Sync>;
pub type StoreFn =
  Arc<dyn Fn(String, String, f32) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type ForgetFn = Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type SearchFn =
  Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<Vec<String>>> + Send + Sync>;

/// Capabilities the host exposes to the engine. Every slot is optional; an
/// absent slot disables the dependent feature without failing the hook.
#[derive(Default, Clone)]
pub struct HostTools {
  /// Free-form completion on the host's own model.
  pub llm: Option<LlmFn>,
  /// Query the host's long-term memory.
  pub memory_recall: Option<RecallFn>,
  /// Persist `(text, category, importance)` into the host's memory.
  pub memory_store: Option<StoreFn>,
  /// Drop host memories matching a query.
  pub memory_forget: Option<ForgetFn>,
  /// Grep the active workspace.
  pub workspace_grep: Option<SearchFn>,
  /// Search the web, returning result snippets.
  pub web_search: Option<SearchFn>,
}

impl HostTools {
  #[must_use]
  pub fn can_edit_memory(&self) -> bool {
    self.memory_store.is_some() || self.memory_forget.is_some()
  }
}

/// Box a plain async closure into an [`LlmFn`].
pub fn llm_fn<F, Fut>(f: F) -> LlmFn
where
  F: Fn(String) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
  Arc::new(move |prompt| Box::pin(f(prompt)) as BoxFuture<'static, _>)
}

/// Box a plain async closure into a [`SearchFn`] / [`RecallFn`].
pub fn search_fn<F, Fut>(f: F) -> SearchFn
where
  F: Fn(String) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = anyhow::Result<Vec<String>>> + Send + 'static,
{
  Arc::new(move |query| Box::pin(f(query)) as BoxFuture<'static, _>)
}

/// Box a plain async closure into a [`StoreFn`].
pub fn store_fn<F, Fut>(f: F) -> StoreFn
where
  F: Fn(String, String, f32) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
  Arc::new(move |text, category, importance| {
    Box::pin(f(text, category, importance)) as BoxFuture<'static, _>
  })
}

/// Box a plain async closure into a [`ForgetFn`].
pub fn forget_fn<F, Fut>(f: F) -> ForgetFn
where
  F: Fn(String) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
  Arc::new(move |query| Box::pin(f(query)) as BoxFuture<'static, _>)
}
