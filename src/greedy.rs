//! Mean-based baselines: a uniform random suspect and epsilon-greedy.
//!
//! Both keep running per-arm penalty means. The random learner ignores them when
//! choosing and predicts zero, so with it the residual test reduces to
//! `penalty > residual_threshold`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::policy::{
    argmax_random_tiebreak, context_is_clean, context_value, first_untried, note_argmax,
    sanitize, ArmStats, Learner,
};
use crate::{Decision, DecisionNote, DecisionPolicy};

fn push_penalty(stats: &mut [ArmStats], arm: usize, penalty: f64) {
    if !penalty.is_finite() {
        tracing::debug!(arm, penalty, "non-finite penalty absorbed as zero");
    }
    if let Some(s) = stats.get_mut(arm) {
        s.push(sanitize(penalty));
    }
}

/// Uniform random suspect after warm-up.
#[derive(Debug, Clone)]
pub struct RandomLearner {
    stats: Vec<ArmStats>,
    rng: StdRng,
}

impl RandomLearner {
    pub fn with_seed(n_arms: usize, seed: u64) -> Self {
        Self {
            stats: vec![ArmStats::default(); n_arms.max(1)],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn stats(&self) -> &[ArmStats] {
        &self.stats
    }
}

impl Learner for RandomLearner {
    fn name(&self) -> &'static str {
        "random"
    }

    fn n_arms(&self) -> usize {
        self.stats.len()
    }

    fn decide(&mut self, _context: &[f64]) -> Decision {
        if let Some(arm) = first_untried(self.stats.iter().map(|s| s.uses)) {
            return Decision::explore_first(DecisionPolicy::Random, arm);
        }
        let n = self.stats.len();
        let mut d = Decision::new(DecisionPolicy::Random, self.rng.random_range(0..n));
        d.probs = Some(vec![1.0 / n as f64; n]);
        d.notes.push(DecisionNote::UniformExplore);
        d
    }

    fn update(&mut self, arm: usize, _context_value: f64, penalty: f64) {
        push_penalty(&mut self.stats, arm, penalty);
    }

    fn predicted_penalty(&self, _arm: usize, _context_value: f64) -> f64 {
        0.0
    }
}

/// Epsilon-greedy over `mean_i * c_i`.
#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    epsilon: f64,
    stats: Vec<ArmStats>,
    rng: StdRng,
}

impl EpsilonGreedy {
    /// `epsilon` outside `[0, 1]` (or non-finite) is clamped; NaN means never explore.
    pub fn with_seed(n_arms: usize, epsilon: f64, seed: u64) -> Self {
        Self {
            epsilon: if epsilon.is_finite() {
                epsilon.clamp(0.0, 1.0)
            } else {
                0.0
            },
            stats: vec![ArmStats::default(); n_arms.max(1)],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn stats(&self) -> &[ArmStats] {
        &self.stats
    }

    fn scores(&self, context: &[f64]) -> Vec<f64> {
        self.stats
            .iter()
            .enumerate()
            .map(|(i, s)| s.mean * context_value(context, i))
            .collect()
    }
}

impl Learner for EpsilonGreedy {
    fn name(&self) -> &'static str {
        "epsilon-greedy"
    }

    fn n_arms(&self) -> usize {
        self.stats.len()
    }

    fn decide(&mut self, context: &[f64]) -> Decision {
        if let Some(arm) = first_untried(self.stats.iter().map(|s| s.uses)) {
            return Decision::explore_first(DecisionPolicy::EpsilonGreedy, arm);
        }
        let n = self.stats.len();
        let mut d = if self.rng.random::<f64>() < self.epsilon {
            let mut d = Decision::new(DecisionPolicy::EpsilonGreedy, self.rng.random_range(0..n));
            d.notes.push(DecisionNote::UniformExplore);
            d
        } else {
            let scores = self.scores(context);
            let (arm, tied) = argmax_random_tiebreak(&scores, &mut self.rng);
            let mut d = Decision::new(DecisionPolicy::EpsilonGreedy, arm);
            note_argmax(&mut d, tied);
            d.scores = Some(scores);
            d
        };
        if !context_is_clean(context, n) {
            d.notes.push(DecisionNote::SanitizedContext);
        }
        d
    }

    fn update(&mut self, arm: usize, _context_value: f64, penalty: f64) {
        push_penalty(&mut self.stats, arm, penalty);
    }

    fn predicted_penalty(&self, arm: usize, _context_value: f64) -> f64 {
        self.stats.get(arm).map(|s| s.mean).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_predicts_zero_and_covers_arms() {
        let mut r = RandomLearner::with_seed(3, 5);
        for expected in 0..3 {
            let arm = r.select_arm(&[0.0; 3]);
            assert_eq!(arm, expected);
            r.update(arm, 0.0, 10.0);
        }
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[r.select_arm(&[0.0; 3])] = true;
        }
        assert_eq!(seen, [true; 3]);
        assert_eq!(r.predicted_penalty(1, 4.0), 0.0);
        assert_eq!(r.stats()[0].uses, 1);
    }

    #[test]
    fn greedy_without_epsilon_exploits_largest_scaled_mean() {
        let mut g = EpsilonGreedy::with_seed(3, 0.0, 0);
        g.update(0, 1.0, 1.0);
        g.update(1, 1.0, 5.0);
        g.update(2, 1.0, 2.0);
        // Scores: 1*1, 5*0.1, 2*4
        let d = g.decide(&[1.0, 0.1, 4.0]);
        assert_eq!(d.chosen, 2);
        assert_eq!(d.notes, vec![DecisionNote::DeterministicChoice]);
        assert_eq!(g.predicted_penalty(1, 99.0), 5.0);
    }

    #[test]
    fn epsilon_one_always_explores() {
        let mut g = EpsilonGreedy::with_seed(2, 1.0, 9);
        g.update(0, 1.0, 100.0);
        g.update(1, 1.0, 0.0);
        for _ in 0..20 {
            let d = g.decide(&[1.0, 1.0]);
            assert!(d.notes.contains(&DecisionNote::UniformExplore));
        }
    }

    #[test]
    fn non_finite_penalty_counts_as_zero() {
        let mut g = EpsilonGreedy::with_seed(1, 0.1, 0);
        g.update(0, 1.0, f64::NAN);
        g.update(0, 1.0, 4.0);
        assert_eq!(g.stats()[0].uses, 2);
        assert_eq!(g.predicted_penalty(0, 1.0), 2.0);
    }
}
