//! Boltzmann (softmax) exploration over context-scaled penalty means.
//!
//! After warm-up, arm `i` is drawn with probability proportional to
//! `exp(mean_i * c_i / temperature)`. Low temperatures approach greedy selection; high
//! temperatures approach uniform. It is **seedable** so draws are reproducible.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::alloc::{sample_index, softmax};
use crate::policy::{context_is_clean, context_value, first_untried, sanitize, ArmStats, Learner};
use crate::{Decision, DecisionNote, DecisionPolicy};

/// Configuration for softmax exploration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxConfig {
    /// Must be finite and > 0; anything else behaves as `1.0`.
    pub temperature: f64,
}

impl Default for SoftmaxConfig {
    fn default() -> Self {
        Self { temperature: 1.0 }
    }
}

/// Seedable softmax suspect learner.
#[derive(Debug, Clone)]
pub struct SoftmaxExplorer {
    cfg: SoftmaxConfig,
    stats: Vec<ArmStats>,
    rng: StdRng,
}

impl SoftmaxExplorer {
    pub fn with_seed(n_arms: usize, cfg: SoftmaxConfig, seed: u64) -> Self {
        Self {
            cfg,
            stats: vec![ArmStats::default(); n_arms.max(1)],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Current selection probabilities for a context.
    pub fn probabilities(&self, context: &[f64]) -> Vec<f64> {
        let scores: Vec<f64> = self
            .stats
            .iter()
            .enumerate()
            .map(|(i, s)| s.mean * context_value(context, i))
            .collect();
        softmax(&scores, self.cfg.temperature)
    }
}

impl Learner for SoftmaxExplorer {
    fn name(&self) -> &'static str {
        "softmax"
    }

    fn n_arms(&self) -> usize {
        self.stats.len()
    }

    fn decide(&mut self, context: &[f64]) -> Decision {
        if let Some(arm) = first_untried(self.stats.iter().map(|s| s.uses)) {
            return Decision::explore_first(DecisionPolicy::Softmax, arm);
        }
        let probs = self.probabilities(context);
        let (arm, fell_through) = sample_index(&mut self.rng, &probs);
        let mut d = Decision::new(DecisionPolicy::Softmax, arm);
        d.notes.push(DecisionNote::SampledFromDistribution);
        if fell_through {
            d.notes.push(DecisionNote::NumericalFallbackToLastArm);
        }
        if !context_is_clean(context, self.stats.len()) {
            d.notes.push(DecisionNote::SanitizedContext);
        }
        d.probs = Some(probs);
        d
    }

    fn update(&mut self, arm: usize, _context_value: f64, penalty: f64) {
        if !penalty.is_finite() {
            tracing::debug!(arm, penalty, "non-finite penalty absorbed as zero");
        }
        if let Some(s) = self.stats.get_mut(arm) {
            s.push(sanitize(penalty));
        }
    }

    fn predicted_penalty(&self, arm: usize, _context_value: f64) -> f64 {
        self.stats.get(arm).map(|s| s.mean).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probabilities_follow_scaled_means() {
        let mut s = SoftmaxExplorer::with_seed(2, SoftmaxConfig::default(), 0);
        s.update(0, 1.0, 0.0);
        s.update(1, 1.0, 2.0);
        let p = s.probabilities(&[1.0, 1.0]);
        let expected = 1.0 / (1.0 + (-2.0f64).exp());
        assert!((p[1] - expected).abs() < 1e-12);
        assert!((p[0] + p[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cold_temperature_is_effectively_greedy() {
        let mut s = SoftmaxExplorer::with_seed(3, SoftmaxConfig { temperature: 1e-3 }, 4);
        s.update(0, 1.0, 1.0);
        s.update(1, 1.0, 3.0);
        s.update(2, 1.0, 2.0);
        for _ in 0..50 {
            let d = s.decide(&[1.0, 1.0, 1.0]);
            assert_eq!(d.chosen, 1);
            assert!(d.probs.is_some());
        }
    }

    #[test]
    fn crash_sized_means_do_not_overflow() {
        let mut s = SoftmaxExplorer::with_seed(2, SoftmaxConfig::default(), 1);
        s.update(0, 1.0, 1.0e6);
        s.update(1, 1.0, 1.0e6);
        let p = s.probabilities(&[50.0, 50.0]);
        assert!(p.iter().all(|v| v.is_finite()));
        assert!((p[0] - 0.5).abs() < 1e-12);
    }
}
