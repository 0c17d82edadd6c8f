//! `platoon`: adaptive sensor-fault detection for a simulated vehicle platoon.
//!
//! A single-lane platoon tries to hold a target gap between consecutive units using
//! distance sensors that sometimes lie. Every tick, an online learner (a multi-armed
//! bandit whose arms are the trailing units) names the unit it believes is most likely
//! to be reading wrong; when the penalty observed for that unit disagrees with the
//! learner's own prediction, the loop distrusts the sensor and steers that unit from
//! ground truth instead.
//!
//! **Pieces:**
//! - [`Unit`] / [`build_platoon`]: vehicles with bounded speed and acceleration.
//! - [`FaultInjector`]: scheduled or random multiplicative sensor corruption.
//! - [`Learner`] / [`LearnerKind`]: the bandit interface and its registry.
//!   [`LinUcb`] is the reference; [`LinTs`], [`ThompsonSampling`],
//!   [`BootstrapThompson`], [`EpsilonGreedy`], [`BootstrapUcb`], [`SoftmaxExplorer`],
//!   [`Ucb1`] and [`RandomLearner`] are drop-in alternatives.
//! - [`PenaltyEvaluator`]: squared gap error, or a crash penalty when acting on a
//!   corrupted reading would cause a collision one tick ahead.
//! - [`Simulation`] / [`run_many`]: the MONITOR → ANALYZE → PLAN → EXECUTE loop.
//! - [`TickObserver`]: per-tick hook ([`TracingObserver`], [`TimelineRecorder`],
//!   [`ConsoleTable`]).
//!
//! **Scores:** per trailing unit and tick, *penalty* is the cost of the distance the
//! loop acted on, *regret* is that minus the cost of acting on ground truth, and the
//! *baseline* pair is what the same tick would have cost with no correction at all.
//!
//! **Determinism:** one base seed drives everything. Run `i` derives separate streams
//! for fault injection and for the learner, so results are reproducible per run.
//!
//! # Example
//!
//! ```rust
//! use platoon::{InitialState, LearnerKind, NoopObserver, SimConfig, Simulation};
//!
//! let mut cfg = SimConfig::default();
//! cfg.simulation.training_iterations = 5;
//! cfg.simulation.iterations = 20;
//!
//! let rows: Vec<InitialState> = [0.0, 5.0, 10.0]
//!     .iter()
//!     .map(|&location| InitialState { location, speed: 2.0 })
//!     .collect();
//!
//! let sim = Simulation::new(&cfg, &rows, LearnerKind::LinUcb, 0).unwrap();
//! let summary = sim.run(&mut NoopObserver).unwrap();
//! assert_eq!(summary.ticks, 25);
//! assert_eq!(summary.units.len(), 2);
//! ```
//!
//! **Non-goals:** real-time operation, multi-lane or 2D motion, persisting simulation
//! state, distributed execution.

#![forbid(unsafe_code)]

mod error;
pub use error::{Error, Result};

mod config;
pub use config::*;

mod unit;
pub use unit::*;

mod seeds;
pub use seeds::*;

mod fault;
pub use fault::*;

mod decision;
pub use decision::*;

mod alloc;
pub use alloc::*;

mod policy;
pub use policy::{build_learner, ArmStats, Learner, LearnerKind, TIEBREAK_EPS};

mod contextual;
pub use contextual::*;

mod thompson;
pub use thompson::*;

mod greedy;
pub use greedy::*;

mod ucb;
pub use ucb::*;

mod boltzmann;
pub use boltzmann::*;

mod knowledge;
pub use knowledge::*;

mod evaluator;
pub use evaluator::*;

mod summary;
pub use summary::*;

mod observer;
pub use observer::*;

mod control;
pub use control::*;

mod input;
pub use input::*;
