//! The `Learner` trait shared by every suspect-selection strategy, and the registry that
//! builds them by name.
//!
//! Arms are trailing-unit indices `0..n_arms`. The context handed to a learner holds one
//! value per arm: the absolute deviation of that unit's sensor reading from the ideal
//! distance. Penalties are costs, so every learner here *maximizes* predicted penalty:
//! the arm it selects is the one it considers most likely to be reading wrong.
//!
//! Shared contract:
//! - `select_arm`/`decide` always return an index in `[0, n_arms)`.
//! - Warm-up: each arm is chosen once, in index order, before any learned policy runs.
//! - Ties (within [`TIEBREAK_EPS`]) are broken uniformly at random by the learner's
//!   seeded RNG, so later arms are never starved by index order.
//! - `update` touches only the given arm and never panics; non-finite inputs are
//!   absorbed as a zero contribution.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::LearnerConfig;
use crate::error::{Error, Result};
use crate::{
    BootstrapThompson, BootstrapThompsonConfig, BootstrapUcb, BootstrapUcbConfig, Decision,
    DecisionNote, EpsilonGreedy, LinTs, LinTsConfig, LinUcb, LinUcbConfig, RandomLearner,
    SoftmaxConfig, SoftmaxExplorer, ThompsonConfig, ThompsonSampling, Ucb1,
};

/// Scores closer than this are treated as tied.
pub const TIEBREAK_EPS: f64 = 1e-12;

/// Common interface for suspect-selection learners.
///
/// # Example
///
/// ```rust
/// use platoon::{LearnerConfig, LearnerKind};
///
/// let mut learner = LearnerKind::LinUcb.build(3, &LearnerConfig::default(), 7);
/// let context = [0.1, 4.0, 0.2];
/// for _ in 0..10 {
///     let arm = learner.select_arm(&context);
///     assert!(arm < 3);
///     learner.update(arm, context[arm], context[arm].powi(2));
/// }
/// ```
pub trait Learner: Send {
    /// Stable identifier used in reports.
    fn name(&self) -> &'static str;

    fn n_arms(&self) -> usize;

    /// Choose the suspect arm and explain why.
    fn decide(&mut self, context: &[f64]) -> Decision;

    /// Choose the suspect arm.
    fn select_arm(&mut self, context: &[f64]) -> usize {
        self.decide(context).chosen
    }

    /// Fold the observed `penalty` for `arm` (seen with `context_value`) into the model.
    fn update(&mut self, arm: usize, context_value: f64, penalty: f64);

    /// Current penalty prediction for `arm` at `context_value`.
    fn predicted_penalty(&self, arm: usize, context_value: f64) -> f64;
}

/// The closed set of learners this crate ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LearnerKind {
    LinUcb,
    LinTs,
    Random,
    EpsilonGreedy,
    Thompson,
    BootstrapThompson,
    BootstrapUcb,
    Softmax,
    Ucb1,
}

impl LearnerKind {
    pub const ALL: [LearnerKind; 9] = [
        LearnerKind::LinUcb,
        LearnerKind::LinTs,
        LearnerKind::Random,
        LearnerKind::EpsilonGreedy,
        LearnerKind::Thompson,
        LearnerKind::BootstrapThompson,
        LearnerKind::BootstrapUcb,
        LearnerKind::Softmax,
        LearnerKind::Ucb1,
    ];

    /// Registry key.
    pub fn name(self) -> &'static str {
        match self {
            LearnerKind::LinUcb => "linucb",
            LearnerKind::LinTs => "lints",
            LearnerKind::Random => "random",
            LearnerKind::EpsilonGreedy => "epsilon-greedy",
            LearnerKind::Thompson => "thompson",
            LearnerKind::BootstrapThompson => "bootstrap-thompson",
            LearnerKind::BootstrapUcb => "bootstrap-ucb",
            LearnerKind::Softmax => "softmax",
            LearnerKind::Ucb1 => "ucb1",
        }
    }

    /// Look a learner up by registry key (case-insensitive, `_` and `-` interchangeable).
    pub fn from_name(name: &str) -> Result<Self> {
        let key = name.trim().to_ascii_lowercase().replace('_', "-");
        let alias = match key.as_str() {
            "linear-ucb" | "linearucb" => Some(LearnerKind::LinUcb),
            "linear-ts" | "linearts" | "linear-thompson" => Some(LearnerKind::LinTs),
            "bootstrapped-ts" | "bootstrappedts" | "bootstrapped-thompson" => {
                Some(LearnerKind::BootstrapThompson)
            }
            "boltzmann" => Some(LearnerKind::Softmax),
            "uniform" => Some(LearnerKind::Random),
            _ => None,
        };
        alias
            .or_else(|| Self::ALL.into_iter().find(|k| k.name() == key))
            .ok_or_else(|| Error::UnknownLearner {
                name: name.to_string(),
                known: Self::ALL.map(|k| k.name()).join(", "),
            })
    }

    /// Construct a fresh learner over `n_arms` arms.
    pub fn build(self, n_arms: usize, cfg: &LearnerConfig, seed: u64) -> Box<dyn Learner> {
        match self {
            LearnerKind::LinUcb => Box::new(LinUcb::new(
                n_arms,
                LinUcbConfig {
                    dim: cfg.d,
                    lambda: cfg.lambda,
                    alpha: cfg.alpha,
                    seed,
                },
            )),
            LearnerKind::LinTs => Box::new(LinTs::new(
                n_arms,
                LinTsConfig {
                    dim: cfg.d,
                    lambda: cfg.lambda,
                    scale: cfg.posterior_scale,
                    seed,
                },
            )),
            LearnerKind::Random => Box::new(RandomLearner::with_seed(n_arms, seed)),
            LearnerKind::EpsilonGreedy => {
                Box::new(EpsilonGreedy::with_seed(n_arms, cfg.epsilon, seed))
            }
            LearnerKind::Thompson => Box::new(ThompsonSampling::with_seed(
                n_arms,
                ThompsonConfig {
                    prior_mean: 0.0,
                    prior_variance: cfg.prior_variance,
                },
                seed,
            )),
            LearnerKind::BootstrapThompson => Box::new(BootstrapThompson::with_seed(
                n_arms,
                BootstrapThompsonConfig {
                    n_bootstrap: cfg.n_bootstrap,
                },
                seed,
            )),
            LearnerKind::BootstrapUcb => Box::new(BootstrapUcb::with_seed(
                n_arms,
                BootstrapUcbConfig {
                    n_bootstrap: cfg.n_bootstrap,
                    alpha: cfg.alpha,
                },
                seed,
            )),
            LearnerKind::Softmax => Box::new(SoftmaxExplorer::with_seed(
                n_arms,
                SoftmaxConfig {
                    temperature: cfg.temperature,
                },
                seed,
            )),
            LearnerKind::Ucb1 => Box::new(Ucb1::with_seed(n_arms, seed)),
        }
    }
}

impl fmt::Display for LearnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LearnerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Build a learner from its registry key.
pub fn build_learner(
    name: &str,
    n_arms: usize,
    cfg: &LearnerConfig,
    seed: u64,
) -> Result<Box<dyn Learner>> {
    Ok(LearnerKind::from_name(name)?.build(n_arms, cfg, seed))
}

/// Context value for `arm`: missing or non-finite entries read as zero.
pub(crate) fn context_value(context: &[f64], arm: usize) -> f64 {
    sanitize(context.get(arm).copied().unwrap_or(0.0))
}

pub(crate) fn context_is_clean(context: &[f64], n_arms: usize) -> bool {
    context.len() >= n_arms && context[..n_arms].iter().all(|v| v.is_finite())
}

pub(crate) fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// First arm that has never been updated.
pub(crate) fn first_untried(uses: impl IntoIterator<Item = u64>) -> Option<usize> {
    uses.into_iter().position(|n| n == 0)
}

/// Argmax with uniform random tie-breaking.
///
/// Non-finite scores never win unless every score is non-finite, in which case all arms
/// tie. Returns the winner and, when more than one arm tied, the tied set.
pub(crate) fn argmax_random_tiebreak<R: Rng + ?Sized>(
    scores: &[f64],
    rng: &mut R,
) -> (usize, Option<Vec<usize>>) {
    let best = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    let tied: Vec<usize> = if best == f64::NEG_INFINITY {
        (0..scores.len()).collect()
    } else {
        scores
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_finite() && (best - **s).abs() <= TIEBREAK_EPS)
            .map(|(i, _)| i)
            .collect()
    };
    match tied.len() {
        0 => (0, None),
        1 => (tied[0], None),
        n => {
            let pick = tied[rng.random_range(0..n)];
            (pick, Some(tied))
        }
    }
}

/// Upper `q`-quantile of `values` (nearest rank); sorts in place. Zero when empty.
pub(crate) fn quantile(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    let idx = ((q * n as f64).ceil() as usize).saturating_sub(1).min(n - 1);
    values[idx]
}

/// Attach the argmax outcome to a decision.
pub(crate) fn note_argmax(decision: &mut Decision, tied: Option<Vec<usize>>) {
    match tied {
        Some(tied) => decision.notes.push(DecisionNote::RandomTieBreak { tied }),
        None => decision.notes.push(DecisionNote::DeterministicChoice),
    }
}

/// Running mean/variance of one arm's penalties (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub uses: u64,
    pub mean: f64,
    m2: f64,
}

impl ArmStats {
    pub fn push(&mut self, x: f64) {
        self.uses = self.uses.saturating_add(1);
        let delta = x - self.mean;
        self.mean += delta / self.uses as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Sample variance; zero until two observations exist.
    pub fn variance(&self) -> f64 {
        if self.uses < 2 {
            0.0
        } else {
            (self.m2 / (self.uses - 1) as f64).max(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn registry_round_trips_every_name() {
        for k in LearnerKind::ALL {
            assert_eq!(LearnerKind::from_name(k.name()).unwrap(), k);
            assert_eq!(k.to_string().parse::<LearnerKind>().unwrap(), k);
            let l = k.build(3, &LearnerConfig::default(), 0);
            assert_eq!(l.name(), k.name());
            assert_eq!(l.n_arms(), 3);
        }
    }

    #[test]
    fn registry_accepts_aliases_and_rejects_unknown() {
        assert_eq!(
            LearnerKind::from_name("LinearUCB").unwrap(),
            LearnerKind::LinUcb
        );
        assert_eq!(
            LearnerKind::from_name("Epsilon_Greedy").unwrap(),
            LearnerKind::EpsilonGreedy
        );
        assert_eq!(LearnerKind::from_name("LinearTS").unwrap(), LearnerKind::LinTs);
        assert_eq!(
            LearnerKind::from_name("BootstrappedTS").unwrap(),
            LearnerKind::BootstrapThompson
        );
        let e = build_learner("oracle", 2, &LearnerConfig::default(), 0)
            .err()
            .unwrap();
        let msg = e.to_string();
        assert!(msg.contains("oracle") && msg.contains("linucb"), "{msg}");
    }

    #[test]
    fn argmax_breaks_ties_across_all_tied_arms() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = [false; 3];
        for _ in 0..200 {
            let (i, tied) = argmax_random_tiebreak(&[1.0, 1.0, 1.0], &mut rng);
            assert_eq!(tied, Some(vec![0, 1, 2]));
            seen[i] = true;
        }
        assert_eq!(seen, [true, true, true]);
    }

    #[test]
    fn argmax_ignores_nan_unless_all_nan() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            argmax_random_tiebreak(&[f64::NAN, 2.0, 1.0], &mut rng),
            (1, None)
        );
        let (i, tied) = argmax_random_tiebreak(&[f64::NAN, f64::NAN], &mut rng);
        assert!(i < 2);
        assert_eq!(tied, Some(vec![0, 1]));
    }

    #[test]
    fn quantile_uses_nearest_rank() {
        let mut v = [5.0, 1.0, 4.0, 2.0, 3.0];
        assert_eq!(quantile(&mut v, 0.5), 3.0);
        assert_eq!(quantile(&mut v, 1.0), 5.0);
        assert_eq!(quantile(&mut v, 0.0), 1.0);
        assert_eq!(quantile(&mut [], 0.9), 0.0);
    }

    #[test]
    fn arm_stats_tracks_mean_and_variance() {
        let mut s = ArmStats::default();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            s.push(x);
        }
        assert_eq!(s.uses, 8);
        assert!((s.mean - 5.0).abs() < 1e-12);
        assert!((s.variance() - 32.0 / 7.0).abs() < 1e-12);
    }
}
