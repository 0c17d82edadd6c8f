// Thin CLI around the platoon library: load config and initial states, run the
// simulation(s), print summaries. All simulation logic lives in the lib crate.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use platoon::{
    read_initial_states, run_many, Aggregate, ConsoleTable, InitialState, LearnerKind, RunSummary,
    SimConfig, TickObserver, TickSnapshot, TimelineRecorder, TracingObserver,
};

/// Simulate a platoon with faulty distance sensors and a bandit that finds them.
#[derive(Parser, Debug)]
#[command(name = "platoon", version)]
struct Cli {
    /// TOML configuration file (defaults are used for anything it omits).
    #[arg(long)]
    config: Option<PathBuf>,

    /// CSV with `start_location` and `start_speed` columns.
    ///
    /// Without it, `num_units` (default four) units start at the target distance with speed 2.
    #[arg(long)]
    initial: Option<PathBuf>,

    /// Learner registry name (see `--list-learners`).
    #[arg(long, env = "PLATOON_LEARNER", default_value = "linucb")]
    learner: String,

    /// Override `simulation.num_simulation_runs`.
    #[arg(long)]
    runs: Option<usize>,

    /// Override `simulation.seed`.
    #[arg(long)]
    seed: Option<u64>,

    /// Print one table row per trailing unit per tick.
    #[arg(long)]
    table: bool,

    /// Write the recorded timeline (every tick of every run) as JSON.
    #[arg(long)]
    timeline: Option<PathBuf>,

    /// Print run summaries and the aggregate as JSON.
    #[arg(long)]
    json: bool,

    /// List registered learners and exit.
    #[arg(long)]
    list_learners: bool,

    /// Log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct Report<'a> {
    runs: &'a [RunSummary],
    aggregate: &'a Aggregate,
}

struct CliObserver {
    log: TracingObserver,
    table: Option<ConsoleTable<io::Stdout>>,
    timeline: Option<TimelineRecorder>,
}

impl TickObserver for CliObserver {
    fn on_tick(&mut self, snapshot: &TickSnapshot) {
        self.log.on_tick(snapshot);
        if let Some(t) = self.table.as_mut() {
            t.on_tick(snapshot);
        }
        if let Some(t) = self.timeline.as_mut() {
            t.on_tick(snapshot);
        }
    }

    fn on_run_end(&mut self, summary: &RunSummary) {
        self.log.on_run_end(summary);
        if let Some(t) = self.timeline.as_mut() {
            t.on_run_end(summary);
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "platoon=warn",
        1 => "platoon=info",
        2 => "platoon=debug",
        _ => "platoon=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn build_config(cli: &Cli) -> platoon::Result<SimConfig> {
    let mut cfg = match &cli.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(runs) = cli.runs {
        cfg.simulation.num_simulation_runs = runs;
    }
    if let Some(seed) = cli.seed {
        cfg.simulation.seed = seed;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn initial_states(cli: &Cli, cfg: &SimConfig) -> platoon::Result<Vec<InitialState>> {
    match &cli.initial {
        Some(path) => read_initial_states(path),
        None => {
            let n = cfg.platoon.num_units.unwrap_or(4);
            tracing::info!(units = n, "no initial-state file; using an evenly spaced platoon");
            Ok((0..n)
                .map(|i| InitialState {
                    location: cfg.platoon.target_distance * i as f64,
                    speed: 2.0,
                })
                .collect())
        }
    }
}

fn print_summaries(runs: &[RunSummary]) {
    for r in runs {
        println!(
            "run {} [{}] ticks={} crashes={} flagged={} corrupted={}",
            r.run, r.learner, r.ticks, r.crashes, r.flagged_ticks, r.corrupted_readings
        );
        println!(
            "  {:>4} {:>14} {:>14} {:>16} {:>16}",
            "unit", "penalty", "regret", "base_penalty", "base_regret"
        );
        for u in &r.units {
            println!(
                "  {:>4} {:>14.3} {:>14.3} {:>16.3} {:>16.3}",
                u.unit, u.total_penalty, u.total_regret, u.baseline_penalty, u.baseline_regret
            );
        }
        println!(
            "  total: regret {:.3} vs baseline {:.3} (improvement {:.3})",
            r.total_regret,
            r.total_baseline_regret,
            r.improvement()
        );
    }
}

fn run(cli: Cli) -> platoon::Result<()> {
    if cli.list_learners {
        for k in LearnerKind::ALL {
            println!("{k}");
        }
        return Ok(());
    }

    let cfg = build_config(&cli)?;
    let kind = LearnerKind::from_name(&cli.learner)?;
    let initial = initial_states(&cli, &cfg)?;

    let mut observer = CliObserver {
        log: TracingObserver,
        table: cli.table.then(|| ConsoleTable::new(io::stdout())),
        timeline: cli.timeline.as_ref().map(|_| TimelineRecorder::new()),
    };
    let (runs, aggregate) = run_many(&cfg, &initial, kind, &mut observer)?;

    if let Some(table) = observer.table.take() {
        if let Err(e) = table.finish() {
            tracing::warn!(error = %e, "console table output failed");
        }
    }
    if let (Some(path), Some(timeline)) = (&cli.timeline, &observer.timeline) {
        timeline.write_json(path)?;
        tracing::info!(path = %path.display(), ticks = timeline.ticks.len(), "timeline written");
    }

    if cli.json {
        let report = Report {
            runs: &runs,
            aggregate: &aggregate,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(out) => println!("{out}"),
            Err(e) => tracing::error!(error = %e, "failed to serialize report"),
        }
    } else {
        print_summaries(&runs);
        if runs.len() > 1 {
            println!(
                "aggregate over {} runs: mean regret {:.3}, mean baseline regret {:.3}, \
                 mean improvement {:.3}, crashes {}",
                aggregate.runs,
                aggregate.mean_regret,
                aggregate.mean_baseline_regret,
                aggregate.mean_improvement,
                aggregate.total_crashes
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            if e.is_configuration() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
