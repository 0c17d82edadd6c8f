//! Simulation configuration.
//!
//! Loaded from TOML; every section has defaults so a partial file is fine. Unknown keys
//! are rejected so typos surface as configuration errors instead of silently using a
//! default.
//!
//! ```toml
//! [platoon]
//! target_distance = 5.0
//! max_acceleration = 2.0
//! max_speed = 10.0
//! easing_factor = 0.5
//!
//! [sensor]
//! sensor_failure_rate = 0.1
//! sensor_failure_range = [1.5, 3.0]
//! mode = "scheduled"
//!
//! [simulation]
//! training_iterations = 20
//! iterations = 200
//! num_simulation_runs = 1
//! seed = 0
//!
//! [learner]
//! d = 1
//! alpha = 1.0
//! posterior_scale = 1.0
//! residual_threshold = 1.0
//! crash_penalty = 1000000.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Physical parameters shared by every unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatoonConfig {
    /// Ideal gap to the unit ahead.
    #[serde(alias = "ideal_distance")]
    pub target_distance: f64,
    /// Bound on the per-tick speed change.
    pub max_acceleration: f64,
    /// Speeds are clamped to `[-max_speed, max_speed]`.
    pub max_speed: f64,
    /// Fraction of the remaining gap to the target speed closed each tick, in `(0, 1]`.
    pub easing_factor: f64,
    /// Expected unit count. Informational: the initial-state table wins when they differ.
    pub num_units: Option<usize>,
}

impl Default for PlatoonConfig {
    fn default() -> Self {
        Self {
            target_distance: 5.0,
            max_acceleration: 2.0,
            max_speed: 10.0,
            easing_factor: 0.5,
            num_units: None,
        }
    }
}

/// How sensor corruption is scheduled during the evaluation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultMode {
    /// A precomputed tick → (unit, multiplier) map; at most one unit per tick.
    #[default]
    Scheduled,
    /// Every trailing unit fails independently on every tick.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    /// Per-tick failure probability (random mode) or fraction of corrupted ticks
    /// (scheduled mode).
    #[serde(alias = "sensor_failure_rate")]
    pub failure_rate: f64,
    /// Inclusive `(min, max)` range of the corruption multiplier.
    #[serde(alias = "sensor_failure_range")]
    pub failure_range: (f64, f64),
    pub mode: FaultMode,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.1,
            failure_range: (1.5, 3.0),
            mode: FaultMode::Scheduled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Ticks run before evaluation; sensors never fail during training.
    pub training_iterations: u64,
    /// Evaluation ticks.
    pub iterations: u64,
    /// Independent runs, each with a fresh platoon and learner.
    pub num_simulation_runs: usize,
    /// Base seed; run `i` derives its own seed from it.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            training_iterations: 20,
            iterations: 200,
            num_simulation_runs: 1,
            seed: 0,
        }
    }
}

/// Learner hyperparameters plus the residual/crash constants of the analyze stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LearnerConfig {
    /// Context feature dimension (>= 1).
    pub d: usize,
    /// Exploration coefficient for the UCB-style learners.
    pub alpha: f64,
    /// Ridge term: each Gram matrix starts at `lambda * I`.
    pub lambda: f64,
    /// Exploration probability for epsilon-greedy.
    pub epsilon: f64,
    /// Resamples per arm for bootstrapped UCB.
    pub n_bootstrap: usize,
    /// Boltzmann temperature for softmax exploration.
    pub temperature: f64,
    /// Prior variance of the Gaussian posteriors used by Thompson sampling.
    pub prior_variance: f64,
    /// Posterior scale `v` of linear Thompson sampling (`theta ~ N(theta_hat, v^2 A^{-1})`).
    pub posterior_scale: f64,
    /// `|penalty - predicted|` above this flags the selected arm as the suspect.
    pub residual_threshold: f64,
    /// Sentinel penalty for a lookahead collision caused by a corrupted reading.
    pub crash_penalty: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            d: 1,
            alpha: 1.0,
            lambda: 1.0,
            epsilon: 0.1,
            n_bootstrap: 100,
            temperature: 1.0,
            prior_variance: 1.0,
            posterior_scale: 1.0,
            residual_threshold: 1.0,
            crash_penalty: 1_000_000.0,
        }
    }
}

/// Complete configuration of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub platoon: PlatoonConfig,
    pub sensor: SensorConfig,
    pub simulation: SimulationConfig,
    pub learner: LearnerConfig,
}

impl SimConfig {
    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: SimConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Total ticks per run (training + evaluation).
    pub fn total_ticks(&self) -> u64 {
        self.simulation
            .training_iterations
            .saturating_add(self.simulation.iterations)
    }

    /// Check every precondition; the error names the offending key.
    pub fn validate(&self) -> Result<()> {
        let p = &self.platoon;
        positive("platoon.target_distance", p.target_distance)?;
        positive("platoon.max_acceleration", p.max_acceleration)?;
        positive("platoon.max_speed", p.max_speed)?;
        if !(p.easing_factor.is_finite() && p.easing_factor > 0.0 && p.easing_factor <= 1.0) {
            return Err(Error::Config(format!(
                "platoon.easing_factor must be in (0, 1], got {}",
                p.easing_factor
            )));
        }

        let s = &self.sensor;
        probability("sensor.sensor_failure_rate", s.failure_rate)?;
        let (lo, hi) = s.failure_range;
        if !(lo.is_finite() && hi.is_finite() && lo >= 0.0 && lo <= hi) {
            return Err(Error::Config(format!(
                "sensor.sensor_failure_range must satisfy 0 <= min <= max, got ({lo}, {hi})"
            )));
        }

        if self.simulation.num_simulation_runs == 0 {
            return Err(Error::Config(
                "simulation.num_simulation_runs must be at least 1".to_string(),
            ));
        }

        let l = &self.learner;
        if l.d == 0 {
            return Err(Error::Config("learner.d must be at least 1".to_string()));
        }
        non_negative("learner.alpha", l.alpha)?;
        positive("learner.lambda", l.lambda)?;
        probability("learner.epsilon", l.epsilon)?;
        if l.n_bootstrap == 0 {
            return Err(Error::Config(
                "learner.n_bootstrap must be at least 1".to_string(),
            ));
        }
        positive("learner.temperature", l.temperature)?;
        positive("learner.prior_variance", l.prior_variance)?;
        non_negative("learner.posterior_scale", l.posterior_scale)?;
        non_negative("learner.residual_threshold", l.residual_threshold)?;
        positive("learner.crash_penalty", l.crash_penalty)?;

        // A crash must outrank the worst corrupted reading taken at ideal spacing.
        let worst = (p.target_distance * (hi - 1.0).abs().max((lo - 1.0).abs())).powi(2);
        if l.crash_penalty <= worst {
            return Err(Error::Config(format!(
                "learner.crash_penalty ({}) must exceed the worst squared deviation of a \
                 corrupted reading ({worst})",
                l.crash_penalty
            )));
        }
        Ok(())
    }
}

fn positive(key: &str, v: f64) -> Result<()> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{key} must be finite and > 0, got {v}")))
    }
}

fn non_negative(key: &str, v: f64) -> Result<()> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("{key} must be finite and >= 0, got {v}")))
    }
}

fn probability(key: &str, v: f64) -> Result<()> {
    if v.is_finite() && (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(Error::Config(format!("{key} must be in [0, 1], got {v}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = SimConfig::from_toml_str(
            r#"
            [platoon]
            target_distance = 4.0

            [sensor]
            sensor_failure_rate = 0.25
            sensor_failure_range = [2.0, 2.5]
            mode = "random"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.platoon.target_distance, 4.0);
        assert_eq!(cfg.platoon.max_speed, PlatoonConfig::default().max_speed);
        assert_eq!(cfg.sensor.failure_rate, 0.25);
        assert_eq!(cfg.sensor.failure_range, (2.0, 2.5));
        assert_eq!(cfg.sensor.mode, FaultMode::Random);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let e = SimConfig::from_toml_str("[learner]\nalpah = 0.5\n").unwrap_err();
        assert!(e.is_configuration());
        assert!(e.to_string().contains("alpah"), "{e}");
    }

    #[test]
    fn validate_names_the_offending_key() {
        let mut cfg = SimConfig::default();
        cfg.platoon.easing_factor = 0.0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("easing_factor"), "{msg}");

        let mut cfg = SimConfig::default();
        cfg.sensor.failure_range = (3.0, 1.0);
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("sensor_failure_range"), "{msg}");

        let mut cfg = SimConfig::default();
        cfg.simulation.num_simulation_runs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SimConfig::default();
        cfg.learner.posterior_scale = -1.0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("posterior_scale"), "{msg}");
    }

    #[test]
    fn crash_penalty_must_dominate_corrupted_deviation() {
        let mut cfg = SimConfig::default();
        // target 5, max multiplier 3 => worst deviation (15 - 5)^2 = 100
        cfg.learner.crash_penalty = 100.0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("crash_penalty"), "{msg}");
        cfg.learner.crash_penalty = 100.5;
        cfg.validate().unwrap();
    }

    #[test]
    fn total_ticks_sums_phases() {
        let cfg = SimConfig::default();
        assert_eq!(cfg.total_ticks(), 220);
    }
}
