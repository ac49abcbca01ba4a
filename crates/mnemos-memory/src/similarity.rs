//! Exact vector similarity used to rescore search candidates.

/// Cosine similarity `dot(a, b) / (|a| * |b|)`, accumulated in f64.
///
/// A zero-norm vector on either side yields 0.0. Mismatched lengths only
/// use the common prefix for the dot product but the full vectors for the
/// norms, so extra components always lower the score.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += f64::from(x) * f64::from(y);
    }
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let score = dot / (norm_a * norm_b);
    if score.is_finite() { score } else { 0.0 }
}

/// Euclidean length of a vector.
pub fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>()
        .sqrt()
}
