//! Counterfactual penalty of a distance reading, with a one-tick collision lookahead.
//!
//! The base cost of acting on distance `h` is `(h - ideal)^2`. To catch readings that
//! would steer a unit into its neighbour, the whole platoon is cloned and advanced one
//! tick as if the control law acted on `h` for the evaluated arm (ground truth for the
//! current suspect, sensor readings for everyone else). If the evaluated unit then
//! touches its leader or its follower, and its sensor is actually corrupted this tick,
//! the cost is the crash penalty instead.

use crate::error::{ensure_len, Result};
use crate::knowledge::Knowledge;
use crate::unit::{collided, Unit};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltyEvaluator {
    ideal: f64,
    crash_penalty: f64,
}

impl PenaltyEvaluator {
    pub fn new(ideal: f64, crash_penalty: f64) -> Self {
        Self {
            ideal,
            crash_penalty,
        }
    }

    pub fn crash_penalty(&self) -> f64 {
        self.crash_penalty
    }

    /// `(distance - ideal)^2`; a non-finite distance costs nothing.
    pub fn base_penalty(&self, distance: f64) -> f64 {
        let dev = distance - self.ideal;
        let p = dev * dev;
        if p.is_finite() {
            p
        } else {
            tracing::debug!(distance, "non-finite distance absorbed as zero penalty");
            0.0
        }
    }

    /// Speed the control law targets for a gap of `distance`.
    pub fn speed_for(&self, cruise_speed: f64, distance: f64) -> f64 {
        cruise_speed + (distance - self.ideal)
    }

    /// Penalty for acting on `hypothesized` as arm `arm`'s distance.
    ///
    /// Fails with an invariant error when the platoon and this tick's readings disagree
    /// on the number of trailing units, or `arm` is not one of them.
    pub fn calculate_penalty(
        &self,
        units: &[Unit],
        knowledge: &Knowledge,
        hypothesized: f64,
        arm: usize,
    ) -> Result<f64> {
        ensure_len("evaluator: readings", units.len().saturating_sub(1), knowledge.n_arms())?;
        let corrupted = knowledge.reading(arm)?.is_corrupted();
        let base = self.base_penalty(hypothesized);
        let idx = arm + 1;

        let mut next: Vec<Unit> = units.to_vec();
        next[0].update(0.0);
        for j in 0..next.len() - 1 {
            let distance = if j == arm {
                hypothesized
            } else if knowledge.suspect == Some(j) {
                knowledge.ground_truth(j)?
            } else {
                knowledge.sensor(j)?
            };
            let u = &mut next[j + 1];
            let modifier = self.speed_for(knowledge.cruise_speed, distance) - u.target_speed;
            u.update(modifier);
        }

        let hits_leader = collided(next[idx - 1].location, next[idx].location);
        let hits_follower = next
            .get(idx + 1)
            .is_some_and(|f| collided(next[idx].location, f.location));

        if (hits_leader || hits_follower) && corrupted {
            Ok(self.crash_penalty)
        } else {
            Ok(base)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatoonConfig;
    use crate::fault::DistanceReading;
    use crate::unit::{build_platoon, InitialState};

    fn setup(locations: &[f64], readings: &[(f64, f64)]) -> (Vec<Unit>, Knowledge) {
        let rows: Vec<InitialState> = locations
            .iter()
            .map(|&location| InitialState {
                location,
                speed: 2.0,
            })
            .collect();
        let units = build_platoon(&rows, &PlatoonConfig::default()).unwrap();
        let mut k = Knowledge::new(5.0);
        k.cruise_speed = units[0].speed;
        k.starting_speeds = units.iter().map(|u| u.speed).collect();
        k.readings = readings
            .iter()
            .map(|&(ground_truth, sensor)| DistanceReading {
                ground_truth,
                sensor,
            })
            .collect();
        (units, k)
    }

    #[test]
    fn truthful_reading_costs_its_squared_deviation() {
        let (units, k) = setup(&[0.0, 5.0, 10.0], &[(5.0, 5.0), (5.0, 5.0)]);
        let ev = PenaltyEvaluator::new(5.0, 1.0e6);
        assert_eq!(ev.calculate_penalty(&units, &k, 5.0, 0).unwrap(), 0.0);
        assert_eq!(ev.calculate_penalty(&units, &k, 7.0, 1).unwrap(), 4.0);
    }

    #[test]
    fn corrupted_reading_that_closes_the_gap_costs_crash_penalty() {
        // Front to back: 10, 8, 0. Arm 0 reads 10 for a true gap of 2, so unit 1
        // accelerates to 4 while the lead holds 2: both end the tick at 12.
        let (units, k) = setup(&[0.0, 8.0, 10.0], &[(2.0, 10.0), (8.0, 8.0)]);
        let ev = PenaltyEvaluator::new(5.0, 1.0e6);
        assert_eq!(ev.calculate_penalty(&units, &k, 10.0, 0).unwrap(), 1.0e6);

        // Same lookahead with an honest sensor: only the base cost.
        let (units, k) = setup(&[0.0, 8.0, 10.0], &[(2.0, 2.0), (8.0, 8.0)]);
        assert_eq!(ev.calculate_penalty(&units, &k, 10.0, 0).unwrap(), 25.0);
    }

    #[test]
    fn suspect_uses_ground_truth_in_lookahead() {
        // Front to back: 20, 18, 16. Arm 1 reads 6 (truth 2) and will move to 18.5.
        let (units, mut k) = setup(&[16.0, 18.0, 20.0], &[(2.0, 10.0), (2.0, 6.0)]);
        let ev = PenaltyEvaluator::new(5.0, 1.0e6);
        // Unit 1 trusts its inflated sensor and pulls away to 22.
        assert_eq!(ev.calculate_penalty(&units, &k, 6.0, 1).unwrap(), 1.0);
        // With arm 0 suspected, unit 1 brakes on its true gap and stops at 18.5.
        k.suspect = Some(0);
        assert_eq!(ev.calculate_penalty(&units, &k, 6.0, 1).unwrap(), 1.0e6);
    }

    #[test]
    fn arm_without_a_reading_is_rejected() {
        let (units, k) = setup(&[0.0, 5.0, 10.0], &[(5.0, 5.0), (5.0, 5.0)]);
        let ev = PenaltyEvaluator::new(5.0, 1.0e6);
        let e = ev.calculate_penalty(&units, &k, 5.0, 2).unwrap_err();
        assert!(!e.is_configuration(), "{e}");

        let (units, k) = setup(&[0.0, 5.0, 10.0], &[(5.0, 5.0)]);
        assert!(ev.calculate_penalty(&units, &k, 5.0, 0).is_err());
    }

    #[test]
    fn penalty_is_never_negative() {
        let (units, k) = setup(&[0.0, 5.0, 10.0], &[(5.0, 5.0), (5.0, 5.0)]);
        let ev = PenaltyEvaluator::new(5.0, 1.0e6);
        for h in [-100.0, 0.0, 2.5, 5.0, 1.0e9, f64::NAN] {
            assert!(ev.calculate_penalty(&units, &k, h, 1).unwrap() >= 0.0);
        }
    }
}
