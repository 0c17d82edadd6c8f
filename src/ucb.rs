//! Count-based upper-confidence learners: UCB1 and bootstrap UCB.
//!
//! Both scale an arm's penalty estimate by its context value and add a bonus that
//! shrinks as the arm is tried more often. `t` is the number of updates so far.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::policy::{
    argmax_random_tiebreak, context_is_clean, context_value, first_untried, note_argmax,
    quantile, sanitize, ArmStats, Learner,
};
use crate::{Decision, DecisionNote, DecisionPolicy};

/// Penalties kept per arm for resampling.
pub const BOOTSTRAP_WINDOW: usize = 1024;

/// UCB1: `mean_i * c_i + sqrt(2 ln t / n_i)`.
#[derive(Debug, Clone)]
pub struct Ucb1 {
    stats: Vec<ArmStats>,
    t: u64,
    rng: StdRng,
}

impl Ucb1 {
    pub fn with_seed(n_arms: usize, seed: u64) -> Self {
        Self {
            stats: vec![ArmStats::default(); n_arms.max(1)],
            t: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn scores(&self, context: &[f64]) -> Vec<f64> {
        let ln_t = (self.t.max(1) as f64).ln();
        self.stats
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let bonus = if s.uses == 0 {
                    0.0
                } else {
                    (2.0 * ln_t / s.uses as f64).sqrt()
                };
                s.mean * context_value(context, i) + bonus
            })
            .collect()
    }
}

impl Learner for Ucb1 {
    fn name(&self) -> &'static str {
        "ucb1"
    }

    fn n_arms(&self) -> usize {
        self.stats.len()
    }

    fn decide(&mut self, context: &[f64]) -> Decision {
        if let Some(arm) = first_untried(self.stats.iter().map(|s| s.uses)) {
            return Decision::explore_first(DecisionPolicy::Ucb1, arm);
        }
        let scores = self.scores(context);
        let (arm, tied) = argmax_random_tiebreak(&scores, &mut self.rng);
        let mut d = Decision::new(DecisionPolicy::Ucb1, arm);
        note_argmax(&mut d, tied);
        d.scores = Some(scores);
        if !context_is_clean(context, self.stats.len()) {
            d.notes.push(DecisionNote::SanitizedContext);
        }
        d
    }

    fn update(&mut self, arm: usize, _context_value: f64, penalty: f64) {
        if !penalty.is_finite() {
            tracing::debug!(arm, penalty, "non-finite penalty absorbed as zero");
        }
        if let Some(s) = self.stats.get_mut(arm) {
            s.push(sanitize(penalty));
            self.t = self.t.saturating_add(1);
        }
    }

    fn predicted_penalty(&self, arm: usize, _context_value: f64) -> f64 {
        self.stats.get(arm).map(|s| s.mean).unwrap_or(0.0)
    }
}

/// Configuration for bootstrap UCB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapUcbConfig {
    /// Resamples per arm per decision (must be >= 1).
    pub n_bootstrap: usize,
    /// Weight of the count bonus.
    pub alpha: f64,
}

impl Default for BootstrapUcbConfig {
    fn default() -> Self {
        Self {
            n_bootstrap: 100,
            alpha: 1.0,
        }
    }
}

/// Bootstrap UCB.
///
/// Score for arm `i`: the `1 - 1/(t+1)` quantile of `n_bootstrap` resampled means of the
/// arm's penalty history, times `c_i`, plus `sqrt(alpha * ln(t+1) / n_i)`.
#[derive(Debug, Clone)]
pub struct BootstrapUcb {
    cfg: BootstrapUcbConfig,
    history: Vec<VecDeque<f64>>,
    stats: Vec<ArmStats>,
    t: u64,
    rng: StdRng,
}

impl BootstrapUcb {
    pub fn with_seed(n_arms: usize, cfg: BootstrapUcbConfig, seed: u64) -> Self {
        let n = n_arms.max(1);
        Self {
            cfg,
            history: vec![VecDeque::with_capacity(BOOTSTRAP_WINDOW); n],
            stats: vec![ArmStats::default(); n],
            t: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn alpha(&self) -> f64 {
        if self.cfg.alpha.is_finite() && self.cfg.alpha >= 0.0 {
            self.cfg.alpha
        } else {
            0.0
        }
    }

    fn bootstrap_quantile(&mut self, arm: usize, q: f64) -> f64 {
        let Some(hist) = self.history.get(arm) else {
            return 0.0;
        };
        if hist.is_empty() {
            return 0.0;
        }
        let b = self.cfg.n_bootstrap.max(1);
        let n = hist.len();
        let mut means = Vec::with_capacity(b);
        for _ in 0..b {
            let mut sum = 0.0;
            for _ in 0..n {
                sum += hist[self.rng.random_range(0..n)];
            }
            means.push(sum / n as f64);
        }
        quantile(&mut means, q)
    }
}

impl Learner for BootstrapUcb {
    fn name(&self) -> &'static str {
        "bootstrap-ucb"
    }

    fn n_arms(&self) -> usize {
        self.stats.len()
    }

    fn decide(&mut self, context: &[f64]) -> Decision {
        if let Some(arm) = first_untried(self.stats.iter().map(|s| s.uses)) {
            return Decision::explore_first(DecisionPolicy::BootstrapUcb, arm);
        }
        let t1 = (self.t + 1) as f64;
        let q = 1.0 - 1.0 / t1;
        let alpha = self.alpha();
        let mut scores = Vec::with_capacity(self.stats.len());
        for arm in 0..self.stats.len() {
            let upper = self.bootstrap_quantile(arm, q);
            let uses = self.stats[arm].uses.max(1) as f64;
            let bonus = (alpha * t1.ln() / uses).sqrt();
            scores.push(upper * context_value(context, arm) + bonus);
        }
        let (arm, tied) = argmax_random_tiebreak(&scores, &mut self.rng);
        let mut d = Decision::new(DecisionPolicy::BootstrapUcb, arm);
        note_argmax(&mut d, tied);
        d.scores = Some(scores);
        if !context_is_clean(context, self.stats.len()) {
            d.notes.push(DecisionNote::SanitizedContext);
        }
        d
    }

    fn update(&mut self, arm: usize, _context_value: f64, penalty: f64) {
        if !penalty.is_finite() {
            tracing::debug!(arm, penalty, "non-finite penalty absorbed as zero");
        }
        let p = sanitize(penalty);
        let (Some(hist), Some(s)) = (self.history.get_mut(arm), self.stats.get_mut(arm)) else {
            return;
        };
        if hist.len() == BOOTSTRAP_WINDOW {
            hist.pop_front();
        }
        hist.push_back(p);
        s.push(p);
        self.t = self.t.saturating_add(1);
    }

    fn predicted_penalty(&self, arm: usize, _context_value: f64) -> f64 {
        self.stats.get(arm).map(|s| s.mean).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ucb1_bonus_favours_rarely_tried_arm() {
        let mut u = Ucb1::with_seed(2, 0);
        u.update(0, 1.0, 0.0);
        for _ in 0..50 {
            u.update(1, 1.0, 0.0);
        }
        // Equal means; arm 0 has the larger bonus.
        assert_eq!(u.select_arm(&[1.0, 1.0]), 0);
    }

    #[test]
    fn ucb1_exploits_large_penalties() {
        let mut u = Ucb1::with_seed(2, 0);
        u.update(0, 1.0, 0.0);
        u.update(1, 1.0, 40.0);
        assert_eq!(u.select_arm(&[1.0, 1.0]), 1);
        assert_eq!(u.predicted_penalty(1, 1.0), 40.0);
    }

    #[test]
    fn bootstrap_quantile_of_constant_history_is_that_constant() {
        let mut b = BootstrapUcb::with_seed(1, BootstrapUcbConfig::default(), 3);
        for _ in 0..5 {
            b.update(0, 1.0, 7.0);
        }
        assert_eq!(b.bootstrap_quantile(0, 0.9), 7.0);
    }

    #[test]
    fn bootstrap_ucb_warms_up_then_picks_the_noisy_arm() {
        let cfg = BootstrapUcbConfig {
            n_bootstrap: 50,
            alpha: 0.5,
        };
        let mut b = BootstrapUcb::with_seed(3, cfg, 11);
        let ctx = [1.0, 2.0, 1.0];
        for expected in 0..3 {
            let arm = b.select_arm(&ctx);
            assert_eq!(arm, expected);
            b.update(arm, ctx[arm], if arm == 1 { 30.0 } else { 0.0 });
        }
        assert_eq!(b.select_arm(&ctx), 1);
    }

    #[test]
    fn bootstrap_history_is_bounded() {
        let mut b = BootstrapUcb::with_seed(1, BootstrapUcbConfig::default(), 0);
        for i in 0..(BOOTSTRAP_WINDOW + 10) {
            b.update(0, 1.0, i as f64);
        }
        assert_eq!(b.history[0].len(), BOOTSTRAP_WINDOW);
        assert_eq!(b.history[0][0], 10.0);
        assert_eq!(b.history[0].back(), Some(&((BOOTSTRAP_WINDOW + 9) as f64)));
    }
}
