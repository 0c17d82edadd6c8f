//! Per-run shared state passed between the loop stages.
//!
//! One `Knowledge` lives inside each [`Simulation`](crate::Simulation). It is reset at the
//! start of every tick, filled by MONITOR, ANALYZE and PLAN in that order, and read by
//! EXECUTE and the observer. Nothing here outlives a tick except the parameters.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_len, Error, Result};
use crate::fault::{DistanceReading, Modification};
use crate::Decision;

/// What PLAN decided for one trailing unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmPlan {
    /// Whether ANALYZE flagged this unit's sensor.
    pub flagged: bool,
    /// Distance the speed target was derived from (ground truth iff flagged).
    pub chosen_distance: f64,
    pub sensor_speed: f64,
    pub truth_speed: f64,
    pub chosen_speed: f64,
    /// `chosen_speed - target_speed`, handed to `Unit::update`.
    pub speed_modifier: f64,
    pub penalty: f64,
    pub regret: f64,
    pub baseline_penalty: f64,
    pub baseline_regret: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Knowledge {
    pub ideal_distance: f64,

    pub tick: u64,
    pub training: bool,
    /// Lead speed at the start of the tick.
    pub cruise_speed: f64,
    /// Speeds of every unit (lead included) at the start of the tick.
    pub starting_speeds: Vec<f64>,
    pub readings: Vec<DistanceReading>,
    pub corruptions: Vec<Modification>,

    /// `|sensor - ideal|` per arm.
    pub context: Vec<f64>,
    pub decision: Option<Decision>,
    /// Penalty the learner was updated with this tick.
    pub learner_penalty: Option<f64>,
    pub predicted_penalty: Option<f64>,
    /// Arm whose reading is treated as faulty this tick.
    pub suspect: Option<usize>,
    pub sensor_penalties: Vec<f64>,
    pub truth_penalties: Vec<f64>,

    pub plans: Vec<ArmPlan>,
}

impl Knowledge {
    pub fn new(ideal_distance: f64) -> Self {
        Self {
            ideal_distance,
            ..Self::default()
        }
    }

    /// Clear every per-tick field.
    pub fn reset(&mut self, tick: u64, training: bool) {
        *self = Self {
            ideal_distance: self.ideal_distance,
            tick,
            training,
            ..Self::default()
        };
    }

    pub fn n_arms(&self) -> usize {
        self.readings.len()
    }

    pub fn selected_arm(&self) -> Option<usize> {
        self.decision.as_ref().map(|d| d.chosen)
    }

    /// This tick's reading for `arm`; an arm past the reading count is an invariant
    /// violation.
    pub fn reading(&self, arm: usize) -> Result<DistanceReading> {
        self.readings.get(arm).copied().ok_or_else(|| {
            Error::Invariant(format!(
                "tick {}: no reading for arm {arm} (have {})",
                self.tick,
                self.readings.len()
            ))
        })
    }

    pub fn sensor(&self, arm: usize) -> Result<f64> {
        Ok(self.reading(arm)?.sensor)
    }

    pub fn ground_truth(&self, arm: usize) -> Result<f64> {
        Ok(self.reading(arm)?.ground_truth)
    }

    /// Every per-arm vector filled so far agrees with the reading count.
    pub(crate) fn check_lengths(&self, stage: &str) -> Result<()> {
        let n = self.n_arms();
        ensure_len(&format!("{stage}: starting speeds"), n + 1, self.starting_speeds.len())?;
        if !self.context.is_empty() {
            ensure_len(&format!("{stage}: context"), n, self.context.len())?;
        }
        if !self.sensor_penalties.is_empty() || !self.truth_penalties.is_empty() {
            ensure_len(&format!("{stage}: sensor penalties"), n, self.sensor_penalties.len())?;
            ensure_len(&format!("{stage}: truth penalties"), n, self.truth_penalties.len())?;
        }
        if !self.plans.is_empty() {
            ensure_len(&format!("{stage}: plans"), n, self.plans.len())?;
        }
        Ok(())
    }
}
