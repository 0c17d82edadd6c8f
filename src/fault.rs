//! Sensor fault injection.
//!
//! Each tick every trailing unit gets a ground-truth gap and a sensor reading. During
//! the training phase the two are always equal. During evaluation the reading may be
//! the truth multiplied by a factor drawn from the configured failure range:
//!
//! - [`FaultMode::Scheduled`]: `round(iterations * failure_rate)` distinct evaluation
//!   ticks are drawn up front; each corrupts exactly one trailing unit with a
//!   multiplier rounded to two decimals.
//! - [`FaultMode::Random`]: every trailing unit fails independently with probability
//!   `failure_rate` on every evaluation tick.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{FaultMode, SensorConfig, SimulationConfig};
use crate::unit::{gap, Unit};

/// One corruption: trailing `unit` reads `multiplier` times its true gap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub unit: usize,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceReading {
    pub ground_truth: f64,
    pub sensor: f64,
}

impl DistanceReading {
    pub fn is_corrupted(&self) -> bool {
        self.sensor != self.ground_truth
    }
}

/// Everything the sensors produced for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    /// One reading per arm (trailing unit `arm + 1`).
    pub readings: Vec<DistanceReading>,
    pub corruptions: Vec<Modification>,
}

#[derive(Debug, Clone)]
pub struct FaultInjector {
    cfg: SensorConfig,
    training_iterations: u64,
    schedule: BTreeMap<u64, Modification>,
    rng: StdRng,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl FaultInjector {
    /// Build the injector for a platoon of `n_units`, drawing the schedule up front.
    pub fn new(cfg: &SensorConfig, sim: &SimulationConfig, n_units: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut schedule = BTreeMap::new();
        if cfg.mode == FaultMode::Scheduled && n_units >= 2 {
            let ticks = usize::try_from(sim.iterations).unwrap_or(usize::MAX);
            let count = ((sim.iterations as f64) * cfg.failure_rate).round();
            let count = if count.is_finite() && count > 0.0 {
                (count as usize).min(ticks)
            } else {
                0
            };
            let mut chosen = rand::seq::index::sample(&mut rng, ticks, count).into_vec();
            chosen.sort_unstable();
            for offset in chosen {
                let unit = rng.random_range(1..n_units);
                let multiplier = round2(draw_multiplier(&mut rng, cfg.failure_range));
                schedule.insert(
                    sim.training_iterations + offset as u64,
                    Modification { unit, multiplier },
                );
            }
        }
        Self {
            cfg: *cfg,
            training_iterations: sim.training_iterations,
            schedule,
            rng,
        }
    }

    /// Precomputed `tick -> corruption` map (empty in random mode).
    pub fn schedule(&self) -> &BTreeMap<u64, Modification> {
        &self.schedule
    }

    pub fn is_training(&self, tick: u64) -> bool {
        tick < self.training_iterations
    }

    /// Read every trailing unit's gap for `tick`, corrupting as configured, and record
    /// the sensor value on the unit. Only modifications that changed a reading are
    /// reported in [`SensorFrame::corruptions`].
    pub fn read(&mut self, units: &mut [Unit], tick: u64) -> SensorFrame {
        let mut frame = SensorFrame {
            readings: Vec::with_capacity(units.len().saturating_sub(1)),
            corruptions: Vec::new(),
        };
        let training = self.is_training(tick);
        let scheduled = self.schedule.get(&tick).copied();

        for i in 1..units.len() {
            let ground_truth = gap(units, i);
            let modification = if training {
                None
            } else {
                match self.cfg.mode {
                    FaultMode::Scheduled => scheduled.filter(|m| m.unit == i),
                    FaultMode::Random => {
                        if self.rng.random::<f64>() < self.cfg.failure_rate {
                            Some(Modification {
                                unit: i,
                                multiplier: draw_multiplier(&mut self.rng, self.cfg.failure_range),
                            })
                        } else {
                            None
                        }
                    }
                }
            };
            let sensor = modification.map_or(ground_truth, |m| ground_truth * m.multiplier);
            // A multiplier of 1.00 (or a zero gap) leaves the reading honest.
            if let Some(m) = modification.filter(|_| sensor != ground_truth) {
                frame.corruptions.push(m);
            }
            units[i].set_distance(sensor);
            frame.readings.push(DistanceReading {
                ground_truth,
                sensor,
            });
        }
        if !frame.corruptions.is_empty() {
            tracing::debug!(tick, corruptions = ?frame.corruptions, "sensor corruption applied");
        }
        frame
    }
}

fn draw_multiplier<R: Rng + ?Sized>(rng: &mut R, (lo, hi): (f64, f64)) -> f64 {
    if lo < hi {
        rng.random_range(lo..=hi)
    } else {
        lo
    }
}
