use thiserror::Error;

/// Error taxonomy of the engine, keyed by observable behaviour.
///
/// Hooks never let any of these escape: the engine's top level catches,
/// logs with source context, and degrades to a smaller injection.
#[derive(Debug, Error)]
pub enum MemoryError {
  /// No embedding credentials at startup. The engine stays dormant and all
  /// hooks no-op until reconfigured.
  #[error("missing configuration: {0}")]
  ConfigMissing(String),

  /// Timeout or 5xx from an outbound service (embedding, text model, web).
  /// Swallowed at the hook boundary; retrieval returns empty, the build
  /// step skips the turn.
  #[error("transient I/O failure: {0}")]
  TransientIo(anyhow::Error),

  /// Model output that could not be parsed. Callers substitute a default
  /// (Stage-II falls back to PARTIAL, the temporal extractor to the
  /// heuristic path).
  #[error("unparseable model output: {0}")]
  Parse(String),

  /// Duplicate-id add or update of a missing row. Adds overwrite, deletes
  /// are idempotent, so this only surfaces from a store that refuses both.
  #[error("storage conflict: {0}")]
  StorageConflict(String),

  /// An optional host callback is absent. The dependent feature disables
  /// silently, logged once per hook.
  #[error("host callback not provided: {0}")]
  CallbackMissing(&'static str),

  /// The vector store was unreachable during initialisation. The engine
  /// marks itself uninitialised and re-tries lazily on the next hook.
  #[error("store initialisation failed: {0}")]
  FatalInit(anyhow::Error),

  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

impl MemoryError {
  pub fn transient<E: Into<anyhow::Error>>(err: E) -> Self {
    Self::TransientIo(err.into())
  }

  #[must_use]
  pub const fn is_transient(&self) -> bool {
    matches!(self, Self::TransientIo(_))
  }

  #[must_use]
  pub const fn is_parse(&self) -> bool {
    matches!(self, Self::Parse(_))
  }
}

impl From<serde_json::Error> for MemoryError {
  fn from(err: serde_json::Error) -> Self {
    Self::Parse(err.to_string())
  }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
