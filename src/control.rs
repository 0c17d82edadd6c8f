//! The per-tick control loop: MONITOR → ANALYZE → PLAN → EXECUTE.
//!
//! A [`Simulation`] owns one run: the platoon, a fresh learner, the fault injector, the
//! evaluator and the shared [`Knowledge`]. Each call to [`Simulation::step`] runs one
//! tick end to end:
//!
//! 1. **MONITOR**: sensors are read (possibly corrupted), starting speeds and the lead's
//!    cruise speed are recorded.
//! 2. **ANALYZE**: the learner picks one arm from `|ideal - sensor|`; if the penalty it
//!    observes for that arm strays from its own prediction by more than
//!    `residual_threshold`, the arm becomes this tick's suspect and its penalty is
//!    recomputed from ground truth. The learner is updated once, for that arm only.
//!    Sensor and ground-truth penalties are then evaluated for every arm.
//! 3. **PLAN**: each trailing unit's speed target comes from its ground-truth gap if it
//!    is the suspect, from its sensor otherwise; regret is measured against always
//!    using ground truth, baseline regret against never correcting.
//! 4. **EXECUTE**: the lead holds speed, trailing units apply their modifiers, scores
//!    accumulate, collisions are counted, and the observer sees the tick.

use crate::config::SimConfig;
use crate::error::{Error, Result};
use crate::evaluator::PenaltyEvaluator;
use crate::fault::FaultInjector;
use crate::knowledge::{ArmPlan, Knowledge};
use crate::observer::{TickObserver, TickRecord, TickSnapshot};
use crate::policy::{Learner, LearnerKind};
use crate::seeds::stream_seed;
use crate::summary::{Aggregate, RunSummary, UnitSummary};
use crate::unit::{build_platoon, detect_collisions, InitialState, Unit};

/// One simulation run.
pub struct Simulation {
    cfg: SimConfig,
    run: usize,
    units: Vec<Unit>,
    learner: Box<dyn Learner>,
    injector: FaultInjector,
    evaluator: PenaltyEvaluator,
    knowledge: Knowledge,
    tick: u64,
    crashes: u64,
    flagged_ticks: u64,
    corrupted_readings: u64,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("run", &self.run)
            .field("learner", &self.learner.name())
            .field("tick", &self.tick)
            .field("units", &self.units.len())
            .field("crashes", &self.crashes)
            .finish()
    }
}

impl Simulation {
    /// Set up run `run` with a learner from the registry.
    ///
    /// Fails with a configuration error (before any tick) when the config is invalid or
    /// fewer than two units are given.
    pub fn new(
        cfg: &SimConfig,
        initial: &[InitialState],
        kind: LearnerKind,
        run: usize,
    ) -> Result<Self> {
        let n_arms = initial.len().saturating_sub(1);
        let learner = kind.build(
            n_arms,
            &cfg.learner,
            stream_seed(cfg.simulation.seed, run, "learner"),
        );
        Self::with_learner(cfg, initial, learner, run)
    }

    /// Set up run `run` with a caller-supplied learner.
    pub fn with_learner(
        cfg: &SimConfig,
        initial: &[InitialState],
        learner: Box<dyn Learner>,
        run: usize,
    ) -> Result<Self> {
        cfg.validate()?;
        let units = build_platoon(initial, &cfg.platoon)?;
        if let Some(expected) = cfg.platoon.num_units {
            if expected != units.len() {
                tracing::warn!(
                    configured = expected,
                    found = units.len(),
                    "unit count differs from configuration; using the initial-state table"
                );
            }
        }
        if learner.n_arms() != units.len() - 1 {
            return Err(Error::Config(format!(
                "learner `{}` has {} arms but the platoon has {} trailing units",
                learner.name(),
                learner.n_arms(),
                units.len() - 1
            )));
        }
        let injector = FaultInjector::new(
            &cfg.sensor,
            &cfg.simulation,
            units.len(),
            stream_seed(cfg.simulation.seed, run, "faults"),
        );
        tracing::info!(
            run,
            learner = learner.name(),
            units = units.len(),
            ticks = cfg.total_ticks(),
            scheduled_faults = injector.schedule().len(),
            "simulation ready"
        );
        Ok(Self {
            evaluator: PenaltyEvaluator::new(cfg.platoon.target_distance, cfg.learner.crash_penalty),
            knowledge: Knowledge::new(cfg.platoon.target_distance),
            cfg: *cfg,
            run,
            units,
            learner,
            injector,
            tick: 0,
            crashes: 0,
            flagged_ticks: 0,
            corrupted_readings: 0,
        })
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn learner(&self) -> &dyn Learner {
        self.learner.as_ref()
    }

    /// State left by the most recent tick.
    pub fn knowledge(&self) -> &Knowledge {
        &self.knowledge
    }

    pub fn injector(&self) -> &FaultInjector {
        &self.injector
    }

    /// Ticks completed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn crashes(&self) -> u64 {
        self.crashes
    }

    pub fn is_finished(&self) -> bool {
        self.tick >= self.cfg.total_ticks()
    }

    /// Run every remaining tick and report.
    pub fn run(mut self, observer: &mut dyn TickObserver) -> Result<RunSummary> {
        while !self.is_finished() {
            self.step(observer)?;
        }
        let summary = self.summary();
        observer.on_run_end(&summary);
        tracing::info!(
            run = self.run,
            learner = %summary.learner,
            crashes = summary.crashes,
            flagged_ticks = summary.flagged_ticks,
            improvement = summary.improvement(),
            "run finished"
        );
        Ok(summary)
    }

    /// Run one tick.
    pub fn step(&mut self, observer: &mut dyn TickObserver) -> Result<()> {
        self.monitor()?;
        self.analyze()?;
        self.plan()?;
        self.execute(observer)?;
        self.tick += 1;
        Ok(())
    }

    fn monitor(&mut self) -> Result<()> {
        let training = self.injector.is_training(self.tick);
        let k = &mut self.knowledge;
        k.reset(self.tick, training);
        k.cruise_speed = self.units[0].speed;
        k.starting_speeds = self.units.iter().map(|u| u.speed).collect();

        let frame = self.injector.read(&mut self.units, self.tick);
        self.corrupted_readings += frame.corruptions.len() as u64;
        k.readings = frame.readings;
        k.corruptions = frame.corruptions;
        k.check_lengths("monitor")
    }

    fn analyze(&mut self) -> Result<()> {
        let n = self.knowledge.n_arms();
        let ideal = self.knowledge.ideal_distance;
        self.knowledge.context = self
            .knowledge
            .readings
            .iter()
            .map(|r| (ideal - r.sensor).abs())
            .collect();

        let decision = self.learner.decide(&self.knowledge.context);
        let arm = decision.chosen;
        if arm >= n {
            return Err(Error::Invariant(format!(
                "learner `{}` selected arm {arm} of {n}",
                self.learner.name()
            )));
        }
        self.knowledge.decision = Some(decision);

        let k = &self.knowledge;
        let mut penalty = self
            .evaluator
            .calculate_penalty(&self.units, k, k.sensor(arm)?, arm)?;
        let context_value = k.context[arm];
        let predicted = self.learner.predicted_penalty(arm, context_value);
        let residual = (penalty - predicted).abs();
        if residual > self.cfg.learner.residual_threshold {
            self.knowledge.suspect = Some(arm);
            let k = &self.knowledge;
            penalty = self
                .evaluator
                .calculate_penalty(&self.units, k, k.ground_truth(arm)?, arm)?;
        }
        tracing::debug!(
            tick = self.tick,
            arm,
            penalty,
            predicted,
            residual,
            flagged = self.knowledge.suspect.is_some(),
            "analyze"
        );
        self.learner.update(arm, context_value, penalty);
        self.knowledge.learner_penalty = Some(penalty);
        self.knowledge.predicted_penalty = Some(predicted);

        let k = &self.knowledge;
        let mut sensor_penalties = Vec::with_capacity(n);
        let mut truth_penalties = Vec::with_capacity(n);
        for j in 0..n {
            let reading = k.reading(j)?;
            sensor_penalties.push(self.evaluator.calculate_penalty(
                &self.units,
                k,
                reading.sensor,
                j,
            )?);
            truth_penalties.push(self.evaluator.calculate_penalty(
                &self.units,
                k,
                reading.ground_truth,
                j,
            )?);
        }
        self.knowledge.sensor_penalties = sensor_penalties;
        self.knowledge.truth_penalties = truth_penalties;
        self.knowledge.check_lengths("analyze")
    }

    fn plan(&mut self) -> Result<()> {
        let k = &self.knowledge;
        let plans = (0..k.n_arms())
            .map(|j| -> Result<ArmPlan> {
                let reading = k.reading(j)?;
                let (sensor, truth) = (reading.sensor, reading.ground_truth);
                let sensor_speed = self.evaluator.speed_for(k.cruise_speed, sensor);
                let truth_speed = self.evaluator.speed_for(k.cruise_speed, truth);
                let flagged = k.suspect == Some(j);
                let (chosen_distance, chosen_speed, penalty) = if flagged {
                    (truth, truth_speed, k.truth_penalties[j])
                } else {
                    (sensor, sensor_speed, k.sensor_penalties[j])
                };
                Ok(ArmPlan {
                    flagged,
                    chosen_distance,
                    sensor_speed,
                    truth_speed,
                    chosen_speed,
                    speed_modifier: chosen_speed - self.units[j + 1].target_speed,
                    penalty,
                    regret: penalty - k.truth_penalties[j],
                    baseline_penalty: k.sensor_penalties[j],
                    baseline_regret: k.sensor_penalties[j] - k.truth_penalties[j],
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.knowledge.plans = plans;
        self.knowledge.check_lengths("plan")
    }

    fn execute(&mut self, observer: &mut dyn TickObserver) -> Result<()> {
        let k = &self.knowledge;
        self.units[0].update(0.0);
        for (j, plan) in k.plans.iter().enumerate() {
            let unit = &mut self.units[j + 1];
            unit.update(plan.speed_modifier);
            unit.accumulate(
                plan.penalty,
                plan.regret,
                plan.baseline_penalty,
                plan.baseline_regret,
            );
        }

        let collisions = detect_collisions(&self.units);
        self.crashes += collisions.len() as u64;
        if k.suspect.is_some() {
            self.flagged_ticks += 1;
        }
        if !collisions.is_empty() {
            tracing::debug!(tick = self.tick, ?collisions, "collision");
        }

        let records = k
            .plans
            .iter()
            .zip(&k.readings)
            .enumerate()
            .map(|(j, (plan, reading))| TickRecord {
                unit: j + 1,
                ground_truth: reading.ground_truth,
                sensor: reading.sensor,
                chosen_distance: plan.chosen_distance,
                predicted_distance: self.units[j + 1].predicted_distance(),
                flagged: plan.flagged,
                penalty: plan.penalty,
                regret: plan.regret,
                baseline_penalty: plan.baseline_penalty,
                baseline_regret: plan.baseline_regret,
            })
            .collect();
        let snapshot = TickSnapshot {
            run: self.run,
            tick: self.tick,
            training: k.training,
            locations: self.units.iter().map(|u| u.location).collect(),
            speeds: self.units.iter().map(|u| u.speed).collect(),
            selected_arm: k.selected_arm().ok_or_else(|| {
                Error::Invariant("execute: no arm was selected this tick".into())
            })?,
            suspect: k.suspect,
            corruptions: k.corruptions.clone(),
            collisions,
            records,
        };
        observer.on_tick(&snapshot);
        Ok(())
    }

    /// Report for the ticks run so far.
    pub fn summary(&self) -> RunSummary {
        let units: Vec<UnitSummary> = self.units[1..]
            .iter()
            .map(|u| UnitSummary {
                unit: u.index,
                total_penalty: u.total_penalty,
                total_regret: u.total_regret,
                baseline_penalty: u.baseline_penalty,
                baseline_regret: u.baseline_regret,
                final_location: u.location,
                final_speed: u.speed,
            })
            .collect();
        RunSummary {
            run: self.run,
            seed: self.cfg.simulation.seed,
            learner: self.learner.name().to_string(),
            ticks: self.tick,
            crashes: self.crashes,
            flagged_ticks: self.flagged_ticks,
            corrupted_readings: self.corrupted_readings,
            total_penalty: units.iter().map(|u| u.total_penalty).sum(),
            total_regret: units.iter().map(|u| u.total_regret).sum(),
            total_baseline_penalty: units.iter().map(|u| u.baseline_penalty).sum(),
            total_baseline_regret: units.iter().map(|u| u.baseline_regret).sum(),
            units,
        }
    }
}

/// Run `num_simulation_runs` independent runs, each with a fresh platoon and learner.
pub fn run_many(
    cfg: &SimConfig,
    initial: &[InitialState],
    kind: LearnerKind,
    observer: &mut dyn TickObserver,
) -> Result<(Vec<RunSummary>, Aggregate)> {
    let mut summaries = Vec::with_capacity(cfg.simulation.num_simulation_runs);
    for run in 0..cfg.simulation.num_simulation_runs {
        let sim = Simulation::new(cfg, initial, kind, run)?;
        summaries.push(sim.run(observer)?);
    }
    let aggregate = Aggregate::from_runs(&summaries)
        .ok_or_else(|| Error::Config("num_simulation_runs must be >= 1".into()))?;
    Ok((summaries, aggregate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{NoopObserver, TimelineRecorder};

    fn rows(locations: &[f64]) -> Vec<InitialState> {
        locations
            .iter()
            .map(|&location| InitialState {
                location,
                speed: 2.0,
            })
            .collect()
    }

    fn quiet_cfg(training: u64, iterations: u64) -> SimConfig {
        let mut cfg = SimConfig::default();
        cfg.simulation.training_iterations = training;
        cfg.simulation.iterations = iterations;
        cfg.sensor.failure_rate = 0.0;
        cfg
    }

    #[test]
    fn steady_platoon_stays_steady() {
        let cfg = quiet_cfg(0, 10);
        let mut sim = Simulation::new(&cfg, &rows(&[0.0, 5.0, 10.0]), LearnerKind::LinUcb, 0)
            .unwrap();
        let mut rec = TimelineRecorder::new();
        for _ in 0..10 {
            sim.step(&mut rec).unwrap();
        }
        assert!(sim.is_finished());
        for s in &rec.ticks {
            assert!(s.suspect.is_none());
            assert!(s.collisions.is_empty());
            assert!(s.records.iter().all(|r| r.penalty == 0.0 && r.regret == 0.0));
            assert_eq!(s.speeds, vec![2.0, 2.0, 2.0]);
        }
        let summary = sim.summary();
        assert_eq!(summary.ticks, 10);
        assert_eq!(summary.crashes, 0);
        assert_eq!(summary.total_baseline_regret, 0.0);
    }

    #[test]
    fn learner_is_updated_once_per_tick() {
        let cfg = quiet_cfg(3, 4);
        let mut sim =
            Simulation::new(&cfg, &rows(&[0.0, 5.0, 10.0]), LearnerKind::Ucb1, 0).unwrap();
        let mut obs = NoopObserver;
        for _ in 0..2 {
            sim.step(&mut obs).unwrap();
        }
        // Warm-up visited arm 0 then arm 1.
        assert_eq!(sim.knowledge().selected_arm(), Some(1));
        assert!(sim.knowledge().learner_penalty.is_some());
        assert!(sim.knowledge().training);
    }

    #[test]
    fn mismatched_learner_is_rejected() {
        let cfg = quiet_cfg(0, 1);
        let learner = LearnerKind::Random.build(5, &cfg.learner, 0);
        let e = Simulation::with_learner(&cfg, &rows(&[0.0, 5.0, 10.0]), learner, 0).unwrap_err();
        assert!(e.is_configuration());
    }

    #[test]
    fn run_many_reports_each_run() {
        let mut cfg = quiet_cfg(2, 5);
        cfg.simulation.num_simulation_runs = 3;
        let (runs, agg) = run_many(
            &cfg,
            &rows(&[0.0, 5.0, 10.0, 15.0]),
            LearnerKind::EpsilonGreedy,
            &mut NoopObserver,
        )
        .unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(agg.runs, 3);
        assert!(runs.iter().all(|r| r.ticks == 7 && r.units.len() == 3));
        assert_eq!(runs[2].run, 2);
    }
}
