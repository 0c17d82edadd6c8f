//! Vehicles ("units") and the platoon they form.
//!
//! Unit 0 is the lead: it is the front-most unit and holds a constant speed. Every other
//! unit trails the one before it in the slice, so a healthy platoon has strictly
//! decreasing locations and each gap is `location[i - 1] - location[i]`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::PlatoonConfig;
use crate::error::{Error, Result};

/// Readings kept for the fallback distance estimate.
pub const HISTORY_LEN: usize = 5;

/// Starting state of one unit, as read from the initial-state table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    pub location: f64,
    pub speed: f64,
}

/// Physical state of one vehicle plus its cumulative scores.
#[derive(Debug, Clone)]
pub struct Unit {
    pub index: usize,
    pub location: f64,
    pub speed: f64,
    /// Speed the control law is steering toward.
    pub target_speed: f64,
    pub target_distance: f64,
    pub max_acceleration: f64,
    pub max_speed: f64,
    pub easing_factor: f64,
    /// Last sensor reading.
    pub observed_distance: Option<f64>,
    history: VecDeque<f64>,
    predicted_distance: Option<f64>,

    pub total_penalty: f64,
    pub total_regret: f64,
    pub baseline_penalty: f64,
    pub baseline_regret: f64,
}

impl Unit {
    pub fn new(index: usize, init: InitialState, cfg: &PlatoonConfig) -> Self {
        let max_speed = cfg.max_speed;
        let speed = clamp_speed(init.speed, max_speed);
        Self {
            index,
            location: init.location,
            speed,
            target_speed: speed,
            target_distance: cfg.target_distance,
            max_acceleration: cfg.max_acceleration,
            max_speed,
            easing_factor: cfg.easing_factor,
            observed_distance: None,
            history: VecDeque::with_capacity(HISTORY_LEN),
            predicted_distance: None,
            total_penalty: 0.0,
            total_regret: 0.0,
            baseline_penalty: 0.0,
            baseline_regret: 0.0,
        }
    }

    pub fn is_lead(&self) -> bool {
        self.index == 0
    }

    /// Shift the target speed by `speed_modifier`, ease the speed toward it, and move.
    ///
    /// The target is clamped to `[-max_speed, max_speed]`. The speed closes
    /// `easing_factor` of the gap to the target, with the change bounded by
    /// `max_acceleration`.
    pub fn update(&mut self, speed_modifier: f64) {
        let m = if speed_modifier.is_finite() {
            speed_modifier
        } else {
            0.0
        };
        self.target_speed = clamp_speed(self.target_speed + m, self.max_speed);

        let delta = (self.easing_factor * (self.target_speed - self.speed))
            .clamp(-self.max_acceleration, self.max_acceleration);
        self.speed = clamp_speed(self.speed + delta, self.max_speed);
        self.location += self.speed;
    }

    /// Record a sensor reading and refresh the fallback estimate.
    pub fn set_distance(&mut self, new_distance: f64) {
        self.observed_distance = Some(new_distance);
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(new_distance);
        let n = self.history.len() as f64;
        self.predicted_distance = Some(self.history.iter().sum::<f64>() / n);
    }

    /// Mean of the last [`HISTORY_LEN`] readings.
    pub fn predicted_distance(&self) -> Option<f64> {
        self.predicted_distance
    }

    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    pub(crate) fn accumulate(&mut self, penalty: f64, regret: f64, base_pen: f64, base_reg: f64) {
        self.total_penalty += penalty;
        self.total_regret += regret;
        self.baseline_penalty += base_pen;
        self.baseline_regret += base_reg;
    }
}

fn clamp_speed(v: f64, max_speed: f64) -> f64 {
    if v.is_finite() {
        v.clamp(-max_speed, max_speed)
    } else {
        0.0
    }
}

/// Build the platoon from initial rows: front-most (greatest location) first.
pub fn build_platoon(initial: &[InitialState], cfg: &PlatoonConfig) -> Result<Vec<Unit>> {
    if initial.len() < 2 {
        return Err(Error::TooFewUnits {
            found: initial.len(),
        });
    }
    let mut rows = initial.to_vec();
    rows.sort_by(|a, b| b.location.total_cmp(&a.location));
    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(i, init)| Unit::new(i, init, cfg))
        .collect())
}

/// Gap between trailing unit `i` (>= 1) and the unit ahead of it.
pub fn gap(units: &[Unit], i: usize) -> f64 {
    units[i - 1].location - units[i].location
}

/// Adjacent pair `(leader, follower)` whose locations crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collision {
    pub leader: usize,
    pub follower: usize,
}

/// Whether `follower` (directly behind `leader`) has reached or passed it.
pub fn collided(leader_location: f64, follower_location: f64) -> bool {
    follower_location >= leader_location
}

/// Every adjacent pair in collision.
pub fn detect_collisions(units: &[Unit]) -> Vec<Collision> {
    units
        .windows(2)
        .filter(|w| collided(w[0].location, w[1].location))
        .map(|w| Collision {
            leader: w[0].index,
            follower: w[1].index,
        })
        .collect()
}
