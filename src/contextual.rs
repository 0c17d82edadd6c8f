//! Linear UCB over per-arm ridge regressions: the reference suspect learner.
//!
//! Each arm (trailing unit) keeps its own ridge-regression state mapping features of the
//! unit's sensor deviation to the penalty that reading produced:
//!
//! ```text
//!   A_i = lambda*I + sum x x^T        b_i = sum p x        theta_i = A_i^{-1} b_i
//!   score_i = theta_i^T x_i + alpha * sqrt(x_i^T A_i^{-1} x_i)
//! ```
//!
//! Selection is the **argmax** of the score: penalties are costs, and the selected arm is
//! the one the model believes most likely to be reading wrong this tick (highest
//! predicted penalty plus uncertainty bonus).
//!
//! `A^{-1}` is maintained incrementally with Sherman–Morrison updates, so `A` stays
//! symmetric positive definite and is never inverted from scratch.
//!
//! Feature map for context value `c` and dimension `d`: `[c]`, then a bias `1`, then
//! `c^2, c^3, ...`.
//!
//! [`LinTs`] keeps the same per-arm ridge state but explores by sampling
//! `theta~ ~ N(theta, v^2 A^{-1})` instead of adding a bonus.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::policy::{
    argmax_random_tiebreak, context_is_clean, context_value, first_untried, note_argmax,
    sanitize, Learner,
};
use crate::{Decision, DecisionNote, DecisionPolicy};

/// Per-arm score tuple: `(ucb, mean, bonus)`.
pub type LinUcbScore = (f64, f64, f64);

/// Configuration for linear UCB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinUcbConfig {
    /// Feature vector dimension (must be >= 1).
    pub dim: usize,
    /// Ridge regularization parameter (lambda, must be finite and > 0).
    pub lambda: f64,
    /// Exploration strength (alpha, must be finite and >= 0).
    pub alpha: f64,
    /// Seed for the tie-breaking RNG.
    pub seed: u64,
}

impl Default for LinUcbConfig {
    fn default() -> Self {
        Self {
            dim: 1,
            lambda: 1.0,
            alpha: 1.0,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct ArmState {
    // A^{-1} for ridge regression (d x d, row-major).
    a_inv: Vec<f64>,
    // b vector (d).
    b: Vec<f64>,
    uses: u64,
}

impl ArmState {
    fn new(dim: usize, lambda: f64) -> Self {
        let mut a_inv = vec![0.0; dim * dim];
        let diag = if lambda.is_finite() && lambda > 0.0 {
            1.0 / lambda
        } else {
            1.0
        };
        for i in 0..dim {
            a_inv[i * dim + i] = diag;
        }
        Self {
            a_inv,
            b: vec![0.0; dim],
            uses: 0,
        }
    }

    fn dim(&self) -> usize {
        self.b.len()
    }

    fn theta(&self) -> Vec<f64> {
        mat_vec(&self.a_inv, self.dim(), &self.b)
    }

    /// Fold one `(x, p)` observation in: `A += x x^T`, `b += p x`.
    fn observe(&mut self, x: &[f64], p: f64) {
        let d = self.dim();
        // Sherman–Morrison update for A^{-1} where A := A + x x^T
        // A^{-1} <- A^{-1} - (A^{-1} x x^T A^{-1}) / (1 + x^T A^{-1} x)
        let ax = mat_vec(&self.a_inv, d, x);
        let denom = 1.0 + dot(x, &ax);
        if denom.is_finite() && denom > 1e-12 {
            for i in 0..d {
                for j in 0..d {
                    self.a_inv[i * d + j] -= (ax[i] * ax[j]) / denom;
                }
            }
        }

        // b <- b + p x
        for (bi, xi) in self.b.iter_mut().zip(x.iter()) {
            *bi += p * xi;
        }
        self.uses = self.uses.saturating_add(1);
    }

    fn snapshot(&self) -> RidgeArmState {
        RidgeArmState {
            a_inv: self.a_inv.clone(),
            b: self.b.clone(),
            uses: self.uses,
        }
    }
}

/// Read-only copy of one arm's ridge-regression statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeArmState {
    /// Inverse design matrix (d x d, row-major).
    pub a_inv: Vec<f64>,
    /// Penalty-weighted feature sum (d).
    pub b: Vec<f64>,
    /// Number of updates for this arm.
    pub uses: u64,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut s = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        s += x * y;
    }
    s
}

fn mat_vec(a: &[f64], dim: usize, x: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; dim];
    for (i, o) in out.iter_mut().enumerate() {
        let row = &a[i * dim..(i + 1) * dim];
        *o = dot(row, x);
    }
    out
}

/// Lower Cholesky factor `L` (row-major) with `L L^T = a`.
///
/// A pivot that is not strictly positive leaves its column zero, so a nearly singular
/// `A^{-1}` samples with less spread instead of producing NaNs.
fn cholesky(a: &[f64], dim: usize) -> Vec<f64> {
    let mut l = vec![0.0; dim * dim];
    for j in 0..dim {
        let mut diag = a[j * dim + j];
        for k in 0..j {
            diag -= l[j * dim + k] * l[j * dim + k];
        }
        if !(diag.is_finite() && diag > 0.0) {
            continue;
        }
        let ljj = diag.sqrt();
        l[j * dim + j] = ljj;
        for i in j + 1..dim {
            let mut s = a[i * dim + j];
            for k in 0..j {
                s -= l[i * dim + k] * l[j * dim + k];
            }
            l[i * dim + j] = s / ljj;
        }
    }
    l
}

/// `[c]`, then `1`, then `c^2, c^3, ...`; non-finite entries become zero.
fn feature_map(dim: usize, c: f64) -> Vec<f64> {
    let c = sanitize(c);
    let mut x = Vec::with_capacity(dim);
    for k in 0..dim {
        x.push(match k {
            0 => c,
            1 => 1.0,
            p => c.powi(p as i32),
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        x.iter_mut().for_each(|v| *v = sanitize(*v));
    }
    x
}

fn observe_sanitized(arms: &mut [ArmState], arm: usize, x: &[f64], penalty: f64) {
    if !penalty.is_finite() {
        tracing::debug!(arm, penalty, "non-finite penalty absorbed as zero");
    }
    let Some(st) = arms.get_mut(arm) else {
        return;
    };
    if x.iter().all(|v| *v == 0.0) {
        tracing::debug!(arm, "zero-norm context: ridge state unchanged");
    }
    st.observe(x, sanitize(penalty));
}

/// Seedable linear UCB suspect learner.
#[derive(Debug, Clone)]
pub struct LinUcb {
    cfg: LinUcbConfig,
    rng: StdRng,
    // One independently allocated state per arm.
    arms: Vec<ArmState>,
}

impl LinUcb {
    pub fn new(n_arms: usize, cfg: LinUcbConfig) -> Self {
        let dim = cfg.dim.max(1);
        Self {
            rng: StdRng::seed_from_u64(cfg.seed),
            arms: (0..n_arms.max(1))
                .map(|_| ArmState::new(dim, cfg.lambda))
                .collect(),
            cfg,
        }
    }

    fn dim(&self) -> usize {
        self.cfg.dim.max(1)
    }

    fn alpha(&self) -> f64 {
        if self.cfg.alpha.is_finite() && self.cfg.alpha >= 0.0 {
            self.cfg.alpha
        } else {
            0.0
        }
    }

    /// Feature vector for one context value.
    pub fn features(&self, c: f64) -> Vec<f64> {
        feature_map(self.dim(), c)
    }

    fn score(&self, st: &ArmState, x: &[f64]) -> LinUcbScore {
        // mean = theta^T x
        let mean = dot(&st.theta(), x);
        // bonus = alpha * sqrt(x^T A^{-1} x)
        let ax = mat_vec(&st.a_inv, self.dim(), x);
        let var = dot(x, &ax).max(0.0);
        let bonus = self.alpha() * var.sqrt();
        (mean + bonus, mean, bonus)
    }

    /// Per-arm `(ucb, mean, bonus)` for a context.
    pub fn scores(&self, context: &[f64]) -> Vec<LinUcbScore> {
        self.arms
            .iter()
            .enumerate()
            .map(|(i, st)| self.score(st, &self.features(context_value(context, i))))
            .collect()
    }

    /// Per-arm `theta = A^{-1} b`.
    pub fn theta_vectors(&self) -> Vec<Vec<f64>> {
        self.arms.iter().map(ArmState::theta).collect()
    }

    /// Copy of one arm's sufficient statistics.
    pub fn arm_state(&self, arm: usize) -> Option<RidgeArmState> {
        self.arms.get(arm).map(ArmState::snapshot)
    }
}

impl Learner for LinUcb {
    fn name(&self) -> &'static str {
        "linucb"
    }

    fn n_arms(&self) -> usize {
        self.arms.len()
    }

    fn decide(&mut self, context: &[f64]) -> Decision {
        let sanitized = !context_is_clean(context, self.arms.len());
        let scores = self.scores(context);

        let mut d = match first_untried(self.arms.iter().map(|s| s.uses)) {
            Some(arm) => Decision::explore_first(DecisionPolicy::LinUcb, arm),
            None => {
                let ucb: Vec<f64> = scores.iter().map(|t| t.0).collect();
                let (arm, tied) = argmax_random_tiebreak(&ucb, &mut self.rng);
                let mut d = Decision::new(DecisionPolicy::LinUcb, arm);
                note_argmax(&mut d, tied);
                d
            }
        };
        d.scores = Some(scores.iter().map(|t| t.0).collect());
        if sanitized {
            d.notes.push(DecisionNote::SanitizedContext);
        }
        d
    }

    fn update(&mut self, arm: usize, context_value: f64, penalty: f64) {
        let x = self.features(context_value);
        observe_sanitized(&mut self.arms, arm, &x, penalty);
    }

    fn predicted_penalty(&self, arm: usize, context_value: f64) -> f64 {
        let Some(st) = self.arms.get(arm) else {
            return 0.0;
        };
        sanitize(dot(&st.theta(), &self.features(context_value)))
    }
}

/// Configuration for linear Thompson sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinTsConfig {
    /// Feature vector dimension (must be >= 1).
    pub dim: usize,
    /// Ridge regularization parameter (lambda, must be finite and > 0).
    pub lambda: f64,
    /// Posterior scale `v`: samples are drawn from `N(theta, v^2 A^{-1})`.
    pub scale: f64,
    pub seed: u64,
}

impl Default for LinTsConfig {
    fn default() -> Self {
        Self {
            dim: 1,
            lambda: 1.0,
            scale: 1.0,
            seed: 0,
        }
    }
}

/// Seedable linear Thompson-sampling suspect learner.
///
/// Same per-arm ridge state as [`LinUcb`]. Each decision draws one `theta~` per arm
/// (via the Cholesky factor of `A^{-1}`) and picks the argmax of `theta~^T x`.
#[derive(Debug, Clone)]
pub struct LinTs {
    cfg: LinTsConfig,
    rng: StdRng,
    arms: Vec<ArmState>,
}

impl LinTs {
    pub fn new(n_arms: usize, cfg: LinTsConfig) -> Self {
        let dim = cfg.dim.max(1);
        Self {
            rng: StdRng::seed_from_u64(cfg.seed),
            arms: (0..n_arms.max(1))
                .map(|_| ArmState::new(dim, cfg.lambda))
                .collect(),
            cfg,
        }
    }

    fn dim(&self) -> usize {
        self.cfg.dim.max(1)
    }

    fn scale(&self) -> f64 {
        if self.cfg.scale.is_finite() && self.cfg.scale >= 0.0 {
            self.cfg.scale
        } else {
            0.0
        }
    }

    pub fn features(&self, c: f64) -> Vec<f64> {
        feature_map(self.dim(), c)
    }

    /// Draw `theta~` for one arm.
    fn sample_theta(&mut self, arm: usize) -> Vec<f64> {
        let d = self.dim();
        let v = self.scale();
        let st = &self.arms[arm];
        let mut theta = st.theta();
        if v == 0.0 {
            return theta;
        }
        let l = cholesky(&st.a_inv, d);
        let z: Vec<f64> = (0..d)
            .map(|_| Distribution::<f64>::sample(&StandardNormal, &mut self.rng))
            .collect();
        for (i, t) in theta.iter_mut().enumerate() {
            *t += v * dot(&l[i * d..(i + 1) * d], &z);
        }
        theta
    }

    pub fn theta_vectors(&self) -> Vec<Vec<f64>> {
        self.arms.iter().map(ArmState::theta).collect()
    }

    pub fn arm_state(&self, arm: usize) -> Option<RidgeArmState> {
        self.arms.get(arm).map(ArmState::snapshot)
    }
}

impl Learner for LinTs {
    fn name(&self) -> &'static str {
        "lints"
    }

    fn n_arms(&self) -> usize {
        self.arms.len()
    }

    fn decide(&mut self, context: &[f64]) -> Decision {
        let sanitized = !context_is_clean(context, self.arms.len());
        let mut d = match first_untried(self.arms.iter().map(|s| s.uses)) {
            Some(arm) => Decision::explore_first(DecisionPolicy::LinTs, arm),
            None => {
                let mut scores = Vec::with_capacity(self.arms.len());
                for arm in 0..self.arms.len() {
                    let x = self.features(context_value(context, arm));
                    let theta = self.sample_theta(arm);
                    scores.push(dot(&theta, &x));
                }
                let (arm, tied) = argmax_random_tiebreak(&scores, &mut self.rng);
                let mut d = Decision::new(DecisionPolicy::LinTs, arm);
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

    fn update(&mut self, arm: usize, context_value: f64, penalty: f64) {
        let x = self.features(context_value);
        observe_sanitized(&mut self.arms, arm, &x, penalty);
    }

    fn predicted_penalty(&self, arm: usize, context_value: f64) -> f64 {
        let Some(st) = self.arms.get(arm) else {
            return 0.0;
        };
        sanitize(dot(&st.theta(), &self.features(context_value)))
    }
}
