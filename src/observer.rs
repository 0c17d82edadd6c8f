//! Per-tick observation hooks.
//!
//! The control loop never prints or blocks. After EXECUTE it hands a [`TickSnapshot`]
//! to a [`TickObserver`], which decides whether to log it, print it or record it.

use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fault::Modification;
use crate::summary::RunSummary;
use crate::unit::Collision;

/// Outcome of one tick for one trailing unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    /// Platoon index of the trailing unit (arm + 1).
    pub unit: usize,
    pub ground_truth: f64,
    pub sensor: f64,
    pub chosen_distance: f64,
    /// Mean of the unit's recent sensor readings.
    pub predicted_distance: Option<f64>,
    pub flagged: bool,
    pub penalty: f64,
    pub regret: f64,
    pub baseline_penalty: f64,
    pub baseline_regret: f64,
}

/// Everything observable about a finished tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub run: usize,
    pub tick: u64,
    pub training: bool,
    /// Post-update locations, front to back.
    pub locations: Vec<f64>,
    /// Post-update speeds, front to back.
    pub speeds: Vec<f64>,
    /// Arm the learner selected.
    pub selected_arm: usize,
    /// Arm whose reading was replaced by ground truth, if any.
    pub suspect: Option<usize>,
    pub corruptions: Vec<Modification>,
    pub collisions: Vec<Collision>,
    pub records: Vec<TickRecord>,
}

impl TickSnapshot {
    pub fn crashed(&self) -> bool {
        !self.collisions.is_empty()
    }
}

pub trait TickObserver {
    fn on_tick(&mut self, snapshot: &TickSnapshot);

    /// Called once when a run completes.
    fn on_run_end(&mut self, _summary: &RunSummary) {}
}

impl<T: TickObserver + ?Sized> TickObserver for &mut T {
    fn on_tick(&mut self, snapshot: &TickSnapshot) {
        (**self).on_tick(snapshot);
    }

    fn on_run_end(&mut self, summary: &RunSummary) {
        (**self).on_run_end(summary);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TickObserver for NoopObserver {
    fn on_tick(&mut self, _snapshot: &TickSnapshot) {}
}

/// One structured `tracing` event per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TickObserver for TracingObserver {
    fn on_tick(&mut self, s: &TickSnapshot) {
        let penalty: f64 = s.records.iter().map(|r| r.penalty).sum();
        let regret: f64 = s.records.iter().map(|r| r.regret).sum();
        tracing::debug!(
            run = s.run,
            tick = s.tick,
            training = s.training,
            selected_arm = s.selected_arm,
            suspect = ?s.suspect,
            corruptions = s.corruptions.len(),
            collisions = s.collisions.len(),
            penalty,
            regret,
            "tick"
        );
        if s.crashed() {
            tracing::warn!(run = s.run, tick = s.tick, collisions = ?s.collisions, "collision");
        }
    }

    fn on_run_end(&mut self, summary: &RunSummary) {
        tracing::info!(
            run = summary.run,
            learner = %summary.learner,
            crashes = summary.crashes,
            total_regret = summary.total_regret,
            baseline_regret = summary.total_baseline_regret,
            "run finished"
        );
    }
}

/// Keeps every snapshot for the timeline dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineRecorder {
    pub ticks: Vec<TickSnapshot>,
    pub runs: Vec<RunSummary>,
}

impl TimelineRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| Error::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl TickObserver for TimelineRecorder {
    fn on_tick(&mut self, snapshot: &TickSnapshot) {
        self.ticks.push(snapshot.clone());
    }

    fn on_run_end(&mut self, summary: &RunSummary) {
        self.runs.push(summary.clone());
    }
}

/// Fan a snapshot out to two observers.
pub struct Tee<A, B>(pub A, pub B);

impl<A: TickObserver, B: TickObserver> TickObserver for Tee<A, B> {
    fn on_tick(&mut self, snapshot: &TickSnapshot) {
        self.0.on_tick(snapshot);
        self.1.on_tick(snapshot);
    }

    fn on_run_end(&mut self, summary: &RunSummary) {
        self.0.on_run_end(summary);
        self.1.on_run_end(summary);
    }
}

/// Plain-text table: one row per trailing unit per tick.
///
/// Markers: `*` corrupted reading, `!` flagged suspect, `X` unit involved in a
/// collision. Write errors are kept and reported by [`ConsoleTable::finish`].
pub struct ConsoleTable<W: Write> {
    out: W,
    header_written: bool,
    error: Option<io::Error>,
}

impl<W: Write> ConsoleTable<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            header_written: false,
            error: None,
        }
    }

    /// Flush and surface the first write error, if any.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_tick(&mut self, s: &TickSnapshot) -> io::Result<()> {
        if !self.header_written {
            writeln!(
                self.out,
                "{:>4} {:>6} {:>4} {:>10} {:>8} {:>8} {:>8} {:>10} {:>10} {:>5}",
                "run", "tick", "unit", "location", "speed", "truth", "sensor", "penalty",
                "regret", "mark"
            )?;
            self.header_written = true;
        }
        for r in &s.records {
            let mut mark = String::new();
            if r.sensor != r.ground_truth {
                mark.push('*');
            }
            if r.flagged {
                mark.push('!');
            }
            if s
                .collisions
                .iter()
                .any(|c| c.leader == r.unit || c.follower == r.unit)
            {
                mark.push('X');
            }
            writeln!(
                self.out,
                "{:>4} {:>6} {:>4} {:>10.2} {:>8.2} {:>8.2} {:>8.2} {:>10.2} {:>10.2} {:>5}",
                s.run,
                s.tick,
                r.unit,
                s.locations.get(r.unit).copied().unwrap_or(f64::NAN),
                s.speeds.get(r.unit).copied().unwrap_or(f64::NAN),
                r.ground_truth,
                r.sensor,
                r.penalty,
                r.regret,
                mark
            )?;
        }
        Ok(())
    }
}

impl<W: Write> TickObserver for ConsoleTable<W> {
    fn on_tick(&mut self, snapshot: &TickSnapshot) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.write_tick(snapshot) {
            self.error = Some(e);
        }
    }
}
