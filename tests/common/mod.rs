#![allow(dead_code)]

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use stratamem::{MemStore, MemoryConfig, MemoryEngine};
use stratamem_ai::{EmbedTask, Embedder, TextModel, VECTOR_DIM};
use stratamem_core::HostTools;
use stratamem_shared::{Result, tokenize};

/// Deterministic bag-of-words embedder: texts sharing tokens land near each
/// other in cosine space, which is all the engine relies on.
pub struct HashEmbedder;

pub fn hash_embed(text: &str) -> Vec<f32> {
  let mut vector = vec![0.0_f32; VECTOR_DIM];
  for token in tokenize(text) {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    vector[(hasher.finish() % VECTOR_DIM as u64) as usize] += 1.0;
  }
  let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm > 0.0 {
    for x in &mut vector {
      *x /= norm;
    }
  }
  vector
}

#[async_trait]
impl Embedder for HashEmbedder {
  async fn embed(&self, text: &str, _task: EmbedTask) -> Result<Vec<f32>> {
    Ok(hash_embed(text))
  }
}

/// Text model double keyed off the calling prompt. The Stage-II verdict is
/// scriptable per test.
pub struct ScriptedModel {
  pub stage2: &'static str,
}

impl Default for ScriptedModel {
  fn default() -> Self {
    Self { stage2: "PARTIAL" }
  }
}

#[async_trait]
impl TextModel for ScriptedModel {
  async fn complete(&self, system: &str, user: &str) -> Result<String> {
    if system.contains("Summarize the conversation") {
      let first = user.lines().next().unwrap_or("the conversation");
      let first = first.split_once(": ").map_or(first, |(_, rest)| rest);
      return Ok(format!("Discussed {first}"));
    }
    if system.contains("Extract 1-3 short reusable facts") {
      return Ok(user.to_owned());
    }
    if system.contains("short topic name") {
      return Ok("Working topic".to_owned());
    }
    if system.contains("judge whether") {
      return Ok(self.stage2.to_owned());
    }
    if system.contains("when the event") {
      // Not JSON: forces the heuristic fallback path.
      return Ok("cannot tell".to_owned());
    }
    if system.contains("behavioural patterns") {
      return Ok("Works in short focused sessions.".to_owned());
    }
    if system.contains("currently learning") {
      return Ok("Knows Rust and async runtimes.".to_owned());
    }
    if system.contains("Merge the existing profile") {
      return Ok("Merged profile.".to_owned());
    }
    if system.contains("Compress the tool output") {
      return Ok("compressed summary".to_owned());
    }
    Ok("ok".to_owned())
  }
}

static TRACING: Once = Once::new();

pub fn engine_with(stage2: &'static str, tools: HostTools) -> (MemoryEngine, Arc<MemStore>) {
  TRACING.call_once(|| {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
  });

  let store = Arc::new(MemStore::new());
  let engine = MemoryEngine::new(
    MemoryConfig::default(),
    store.clone(),
    Arc::new(HashEmbedder),
    Arc::new(ScriptedModel { stage2 }),
    tools,
  );
  (engine, store)
}
