//! Thompson sampling over per-arm Gaussian penalty posteriors.
//!
//! Each arm's mean penalty gets a Normal posterior with one pseudo-observation at
//! `prior_mean`. On a decision every arm draws `theta_i ~ N(mean_i, var_i / (n_i + 1))`
//! and scores `theta_i * c_i`; the largest score is the suspect.
//!
//! Notes:
//! - This learner is **seedable** so selection is reproducible in tests.
//! - `var_i` is the sample variance once two penalties exist, `prior_variance` before.
//!
//! [`BootstrapThompson`] is the optimistic variant: it draws `n_bootstrap` values per
//! arm and scores the upper `1 - 1/(t+1)` quantile of `|theta * c_i|`.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::policy::{
    argmax_random_tiebreak, context_is_clean, context_value, first_untried, quantile,
    sanitize, ArmStats, Learner,
};
use crate::{Decision, DecisionNote, DecisionPolicy};

/// Configuration for Thompson sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThompsonConfig {
    pub prior_mean: f64,
    /// Prior variance (must be > 0).
    pub prior_variance: f64,
}

impl Default for ThompsonConfig {
    fn default() -> Self {
        Self {
            prior_mean: 0.0,
            prior_variance: 1.0,
        }
    }
}

/// Gaussian posterior summary for one arm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianPosterior {
    pub mean: f64,
    pub variance: f64,
    pub uses: u64,
}

/// Seedable Thompson-sampling suspect learner.
#[derive(Debug, Clone)]
pub struct ThompsonSampling {
    cfg: ThompsonConfig,
    stats: Vec<ArmStats>,
    rng: StdRng,
}

impl ThompsonSampling {
    /// Create a Thompson-sampling learner with a deterministic fixed seed (0).
    pub fn new(n_arms: usize, cfg: ThompsonConfig) -> Self {
        Self::with_seed(n_arms, cfg, 0)
    }

    /// Create a Thompson-sampling learner with a fixed seed (reproducible).
    pub fn with_seed(n_arms: usize, cfg: ThompsonConfig, seed: u64) -> Self {
        Self {
            cfg,
            stats: vec![ArmStats::default(); n_arms.max(1)],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn prior_variance(&self) -> f64 {
        let v = self.cfg.prior_variance;
        if v.is_finite() && v > 0.0 {
            v
        } else {
            1.0
        }
    }

    /// Posterior summary for one arm.
    pub fn posterior(&self, arm: usize) -> Option<GaussianPosterior> {
        let s = self.stats.get(arm)?;
        let n = s.uses as f64;
        let prior_mean = sanitize(self.cfg.prior_mean);
        let noise = if s.uses >= 2 {
            s.variance()
        } else {
            self.prior_variance()
        };
        Some(GaussianPosterior {
            mean: (prior_mean + n * s.mean) / (n + 1.0),
            variance: noise / (n + 1.0),
            uses: s.uses,
        })
    }

    fn sample(&mut self, post: GaussianPosterior) -> f64 {
        sample_normal(&mut self.rng, post.mean, post.variance.sqrt())
    }
}

/// One draw from `N(mean, sd^2)`; degenerate parameters return the (sanitized) mean.
fn sample_normal(rng: &mut StdRng, mean: f64, sd: f64) -> f64 {
    if !(mean.is_finite() && sd.is_finite() && sd > 0.0) {
        return sanitize(mean);
    }
    match Normal::new(mean, sd) {
        Ok(dist) => dist.sample(rng),
        Err(_) => mean,
    }
}

impl Learner for ThompsonSampling {
    fn name(&self) -> &'static str {
        "thompson"
    }

    fn n_arms(&self) -> usize {
        self.stats.len()
    }

    /// Policy:
    /// - Explore: the first arm with `uses == 0`.
    /// - Otherwise: sample every arm's posterior, scale by its context, choose the max.
    fn decide(&mut self, context: &[f64]) -> Decision {
        let sanitized = !context_is_clean(context, self.stats.len());
        let mut d = match first_untried(self.stats.iter().map(|s| s.uses)) {
            Some(arm) => Decision::explore_first(DecisionPolicy::Thompson, arm),
            None => {
                let mut scores = Vec::with_capacity(self.stats.len());
                for arm in 0..self.stats.len() {
                    let theta = match self.posterior(arm) {
                        Some(post) => self.sample(post),
                        None => 0.0,
                    };
                    scores.push(theta * context_value(context, arm));
                }
                let (arm, tied) = argmax_random_tiebreak(&scores, &mut self.rng);
                let mut d = Decision::new(DecisionPolicy::Thompson, arm);
                d.notes.push(DecisionNote::SampledPosteriorMax);
                if let Some(tied) = tied {
                    d.notes.push(DecisionNote::RandomTieBreak { tied });
                }
                d.scores = Some(scores);
                d
            }
        };
        if sanitized {
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
        }
    }

    fn predicted_penalty(&self, arm: usize, _context_value: f64) -> f64 {
        self.posterior(arm).map(|p| p.mean).unwrap_or(0.0)
    }
}

/// Configuration for bootstrapped Thompson sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapThompsonConfig {
    /// Draws per arm per decision (must be >= 1).
    pub n_bootstrap: usize,
}

impl Default for BootstrapThompsonConfig {
    fn default() -> Self {
        Self { n_bootstrap: 100 }
    }
}

/// Bootstrapped Thompson sampling.
///
/// Each arm's penalty is modelled as `N(mean_i, var_i)` from its running statistics.
/// A decision draws `n_bootstrap` values per arm and scores the `1 - 1/(t+1)` quantile
/// of `|theta * c_i|`, where `t` counts updates.
#[derive(Debug, Clone)]
pub struct BootstrapThompson {
    cfg: BootstrapThompsonConfig,
    stats: Vec<ArmStats>,
    t: u64,
    rng: StdRng,
}

impl BootstrapThompson {
    pub fn with_seed(n_arms: usize, cfg: BootstrapThompsonConfig, seed: u64) -> Self {
        Self {
            cfg,
            stats: vec![ArmStats::default(); n_arms.max(1)],
            t: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn upper_draw(&mut self, arm: usize, c: f64, q: f64) -> f64 {
        let Some(s) = self.stats.get(arm).copied() else {
            return 0.0;
        };
        let sd = s.variance().sqrt();
        let mut draws: Vec<f64> = (0..self.cfg.n_bootstrap.max(1))
            .map(|_| (sample_normal(&mut self.rng, s.mean, sd) * c).abs())
            .collect();
        quantile(&mut draws, q)
    }
}

impl Learner for BootstrapThompson {
    fn name(&self) -> &'static str {
        "bootstrap-thompson"
    }

    fn n_arms(&self) -> usize {
        self.stats.len()
    }

    fn decide(&mut self, context: &[f64]) -> Decision {
        let sanitized = !context_is_clean(context, self.stats.len());
        let mut d = match first_untried(self.stats.iter().map(|s| s.uses)) {
            Some(arm) => Decision::explore_first(DecisionPolicy::BootstrapThompson, arm),
            None => {
                let q = 1.0 - 1.0 / (self.t + 1) as f64;
                let scores: Vec<f64> = (0..self.stats.len())
                    .map(|arm| self.upper_draw(arm, context_value(context, arm), q))
                    .collect();
                let (arm, tied) = argmax_random_tiebreak(&scores, &mut self.rng);
                let mut d = Decision::new(DecisionPolicy::BootstrapThompson, arm);
                d.notes.push(DecisionNote::SampledPosteriorMax);
                if let Some(tied) = tied {
                    d.notes.push(DecisionNote::RandomTieBreak { tied });
                }
                d.scores = Some(scores);
                d
            }
        };
        if sanitized {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explores_each_arm_once_in_order() {
        let mut ts = ThompsonSampling::with_seed(3, ThompsonConfig::default(), 123);
        let ctx = [1.0, 1.0, 1.0];
        for expected in 0..3 {
            let arm = ts.select_arm(&ctx);
            assert_eq!(arm, expected);
            ts.update(arm, 1.0, 1.0);
        }
    }

    #[test]
    fn deterministic_choice_given_same_seed_and_state() {
        let cfg = ThompsonConfig::default();
        let mut t1 = ThompsonSampling::with_seed(2, cfg, 42);
        let mut t2 = ThompsonSampling::with_seed(2, cfg, 42);
        for t in [&mut t1, &mut t2] {
            t.update(0, 1.0, 4.0);
            t.update(1, 1.0, 0.5);
        }
        let ctx = [1.5, 2.0];
        for _ in 0..10 {
            assert_eq!(t1.decide(&ctx), t2.decide(&ctx));
        }
    }

    #[test]
    fn posterior_mean_shrinks_toward_prior() {
        let mut ts = ThompsonSampling::new(1, ThompsonConfig::default());
        ts.update(0, 1.0, 9.0);
        let p = ts.posterior(0).unwrap();
        assert_eq!(p.uses, 1);
        assert!((p.mean - 4.5).abs() < 1e-12);
        assert!((p.variance - 0.5).abs() < 1e-12);
        assert!((ts.predicted_penalty(0, 3.0) - 4.5).abs() < 1e-12);
    }

    #[test]
    fn prefers_the_arm_with_large_penalties() {
        let mut ts = ThompsonSampling::with_seed(2, ThompsonConfig::default(), 7);
        for _ in 0..20 {
            ts.update(0, 1.0, 0.1);
            ts.update(1, 1.0, 50.0);
        }
        let ctx = [1.0, 1.0];
        let picks_1 = (0..100).filter(|_| ts.select_arm(&ctx) == 1).count();
        assert!(picks_1 > 95, "picks_1={picks_1}");
    }

    #[test]
    fn crash_penalty_and_nan_do_not_panic() {
        let mut ts = ThompsonSampling::with_seed(2, ThompsonConfig::default(), 1);
        ts.update(0, 1.0, 1.0e6);
        ts.update(1, 1.0, f64::NAN);
        ts.update(0, 1.0, 0.0);
        let d = ts.decide(&[f64::INFINITY, 1.0]);
        assert!(d.chosen < 2);
        assert!(d.notes.contains(&DecisionNote::SanitizedContext));
    }

    #[test]
    fn bootstrap_thompson_with_constant_penalties_scores_them_exactly() {
        let mut bt = BootstrapThompson::with_seed(2, BootstrapThompsonConfig::default(), 3);
        for _ in 0..4 {
            bt.update(0, 1.0, 2.0);
            bt.update(1, 1.0, 6.0);
        }
        // Zero variance: every draw is the mean.
        let d = bt.decide(&[2.0, 1.0]);
        assert_eq!(d.scores, Some(vec![4.0, 6.0]));
        assert_eq!(d.chosen, 1);
        assert_eq!(bt.predicted_penalty(0, 9.0), 2.0);
    }

    #[test]
    fn bootstrap_thompson_warms_up_then_prefers_large_penalties() {
        let cfg = BootstrapThompsonConfig { n_bootstrap: 20 };
        let mut bt = BootstrapThompson::with_seed(3, cfg, 5);
        let ctx = [1.0, 1.0, 1.0];
        for expected in 0..3 {
            let d = bt.decide(&ctx);
            assert_eq!(d.chosen, expected);
            assert!(d.is_explore_first());
            bt.update(expected, 1.0, 1.0);
        }
        for i in 0..30 {
            bt.update(0, 1.0, 0.5 + (i % 2) as f64);
            bt.update(1, 1.0, 40.0 + (i % 3) as f64);
            bt.update(2, 1.0, 1.0);
        }
        let picks_1 = (0..50).filter(|_| bt.select_arm(&ctx) == 1).count();
        assert_eq!(picks_1, 50);
    }

    #[test]
    fn bootstrap_thompson_absorbs_non_finite_input() {
        let mut bt = BootstrapThompson::with_seed(2, BootstrapThompsonConfig::default(), 0);
        bt.update(0, 1.0, f64::NAN);
        bt.update(1, 1.0, 1.0e6);
        bt.update(1, 1.0, f64::INFINITY);
        let d = bt.decide(&[f64::NAN, 1.0]);
        assert!(d.chosen < 2);
        assert!(d.scores.unwrap().iter().all(|s| s.is_finite()));
    }
}
