//! Allocation helpers: scores → probabilities → sampled arm.

use rand::Rng;

/// Stable softmax over `scores`.
///
/// - `temperature` controls sharpness; non-finite or non-positive values fall back to `1.0`.
/// - Uses the max-trick, so large penalties (including the crash sentinel) do not overflow.
/// - Non-finite scores get zero mass; if nothing usable remains the result is uniform.
pub fn softmax(scores: &[f64], temperature: f64) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }
    let t = if temperature.is_finite() && temperature > 0.0 {
        temperature
    } else {
        1.0
    };

    let max_score = scores
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    let mut out: Vec<f64> = scores
        .iter()
        .map(|&v| {
            if v.is_finite() {
                ((v - max_score) / t).exp()
            } else {
                0.0
            }
        })
        .collect();
    let denom: f64 = out.iter().sum();
    if denom <= 0.0 || !denom.is_finite() {
        // Degenerate fallback: uniform.
        let n = scores.len() as f64;
        return vec![1.0 / n; scores.len()];
    }
    for v in &mut out {
        *v /= denom;
    }
    out
}

/// Draw an index from `probs`.
///
/// Returns `(index, fell_through)`; `fell_through` is set when floating-point error left
/// the CDF short of the draw and the last index was used.
pub fn sample_index<R: Rng + ?Sized>(rng: &mut R, probs: &[f64]) -> (usize, bool) {
    let r: f64 = rng.random();
    let mut cdf = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cdf += p;
        if r < cdf {
            return (i, false);
        }
    }
    (probs.len().saturating_sub(1), true)
}
