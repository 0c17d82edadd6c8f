//! End-of-run reports and their aggregation across runs.

use serde::{Deserialize, Serialize};

/// Cumulative scores of one trailing unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub unit: usize,
    pub total_penalty: f64,
    pub total_regret: f64,
    pub baseline_penalty: f64,
    pub baseline_regret: f64,
    pub final_location: f64,
    pub final_speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run: usize,
    /// Base seed the run's streams were derived from.
    pub seed: u64,
    pub learner: String,
    pub ticks: u64,
    /// Adjacent-pair collisions over the whole run.
    pub crashes: u64,
    /// Ticks on which a suspect was flagged.
    pub flagged_ticks: u64,
    /// Corrupted sensor readings produced by fault injection.
    pub corrupted_readings: u64,
    pub units: Vec<UnitSummary>,
    pub total_penalty: f64,
    pub total_regret: f64,
    pub total_baseline_penalty: f64,
    pub total_baseline_regret: f64,
}

impl RunSummary {
    /// Regret avoided relative to never correcting.
    pub fn improvement(&self) -> f64 {
        self.total_baseline_regret - self.total_regret
    }
}

/// Means over a batch of runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub learner: String,
    pub runs: usize,
    pub total_crashes: u64,
    pub mean_penalty: f64,
    pub mean_regret: f64,
    pub mean_baseline_penalty: f64,
    pub mean_baseline_regret: f64,
    pub mean_improvement: f64,
    pub mean_flagged_ticks: f64,
}

impl Aggregate {
    /// `None` for an empty batch.
    pub fn from_runs(runs: &[RunSummary]) -> Option<Self> {
        let first = runs.first()?;
        let n = runs.len() as f64;
        let mean = |f: fn(&RunSummary) -> f64| runs.iter().map(f).sum::<f64>() / n;
        Some(Self {
            learner: first.learner.clone(),
            runs: runs.len(),
            total_crashes: runs.iter().map(|r| r.crashes).sum(),
            mean_penalty: mean(|r| r.total_penalty),
            mean_regret: mean(|r| r.total_regret),
            mean_baseline_penalty: mean(|r| r.total_baseline_penalty),
            mean_baseline_regret: mean(|r| r.total_baseline_regret),
            mean_improvement: mean(RunSummary::improvement),
            mean_flagged_ticks: mean(|r| r.flagged_ticks as f64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(i: usize, regret: f64, baseline: f64, crashes: u64) -> RunSummary {
        RunSummary {
            run: i,
            seed: 0,
            learner: "linucb".into(),
            ticks: 10,
            crashes,
            flagged_ticks: 2,
            corrupted_readings: 1,
            units: Vec::new(),
            total_penalty: 0.0,
            total_regret: regret,
            total_baseline_penalty: 0.0,
            total_baseline_regret: baseline,
        }
    }

    #[test]
    fn aggregate_means_and_sums() {
        let a = Aggregate::from_runs(&[run(0, 1.0, 5.0, 1), run(1, 3.0, 3.0, 2)]).unwrap();
        assert_eq!(a.runs, 2);
        assert_eq!(a.total_crashes, 3);
        assert_eq!(a.mean_regret, 2.0);
        assert_eq!(a.mean_improvement, 2.0);
        assert_eq!(a.mean_flagged_ticks, 2.0);
        assert!(Aggregate::from_runs(&[]).is_none());
    }
}
