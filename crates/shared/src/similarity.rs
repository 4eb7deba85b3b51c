/// Cosine similarity between two embedding vectors, in [-1.0, 1.0].
///
/// Mismatched or empty inputs score 0.0 rather than panicking; retrieval
/// treats such rows as unrelated.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.is_empty() || b.is_empty() || a.len() != b.len() {
    return 0.0;
  }

  let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
    (0.0_f32, 0.0_f32, 0.0_f32),
    |(dot, na, nb), (x, y)| (dot + x * y, na + x * x, nb + y * y),
  );

  let denom = norm_a.sqrt() * norm_b.sqrt();
  if denom < 1e-6 {
    return 0.0;
  }
  dot / denom
}

/// Arithmetic mean of a set of vectors. Empty input yields an empty vector.
pub fn centroid(vectors: &[&[f32]]) -> Vec<f32> {
  let Some(first) = vectors.first() else {
    return Vec::new();
  };

  let mut sum = vec![0.0_f32; first.len()];
  for v in vectors {
    for (acc, x) in sum.iter_mut().zip(v.iter()) {
      *acc += x;
    }
  }
  let n = vectors.len() as f32;
  for acc in &mut sum {
    *acc /= n;
  }
  sum
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identical_vectors_score_one() {
    let v = [1.0, 2.0, 3.0];
    assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn orthogonal_vectors_score_zero() {
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
  }

  #[test]
  fn mismatched_lengths_score_zero() {
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
  }

  #[test]
  fn centroid_is_elementwise_mean() {
    let a = [0.0, 2.0];
    let b = [2.0, 0.0];
    assert_eq!(centroid(&[&a, &b]), vec![1.0, 1.0]);
  }
}
