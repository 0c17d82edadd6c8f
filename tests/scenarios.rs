use platoon::{
    build_learner, run_many, Error, FaultMode, InitialState, LearnerKind, NoopObserver,
    SimConfig, Simulation, TimelineRecorder,
};

fn rows(locations: &[f64], speed: f64) -> Vec<InitialState> {
    locations
        .iter()
        .map(|&location| InitialState { location, speed })
        .collect()
}

fn cfg(training: u64, iterations: u64) -> SimConfig {
    let mut cfg = SimConfig::default();
    cfg.simulation.training_iterations = training;
    cfg.simulation.iterations = iterations;
    cfg
}

#[test]
fn uncorrupted_tick_keeps_trailing_speeds_identical_with_zero_regret() {
    // Input rows 0, 5, 10 become front-to-back 10, 5, 0.
    let mut c = cfg(1, 0);
    c.sensor.failure_rate = 0.0;
    let mut sim = Simulation::new(&c, &rows(&[0.0, 5.0, 10.0], 2.0), LearnerKind::LinUcb, 0)
        .unwrap();
    let mut rec = TimelineRecorder::new();
    sim.step(&mut rec).unwrap();

    let s = &rec.ticks[0];
    assert!(s.training);
    assert_eq!(s.speeds[1], s.speeds[2]);
    assert_eq!(s.locations, vec![12.0, 7.0, 2.0]);
    assert!(s.suspect.is_none());
    for r in &s.records {
        assert_eq!(r.regret, 0.0);
        assert_eq!(r.baseline_regret, 0.0);
        assert_eq!(r.ground_truth, 5.0);
        assert_eq!(r.sensor, 5.0);
    }
    let k = sim.knowledge();
    assert_eq!(k.sensor_penalties, k.truth_penalties);
}

#[test]
fn tripled_sensor_is_flagged_and_truth_drives_the_speed() {
    // Two units so the single scheduled fault must land on unit 1.
    let mut c = cfg(0, 1);
    c.sensor.failure_rate = 1.0;
    c.sensor.failure_range = (3.0, 3.0);
    c.sensor.mode = FaultMode::Scheduled;
    c.learner.residual_threshold = 1.0;

    let mut sim =
        Simulation::new(&c, &rows(&[0.0, 5.0], 2.0), LearnerKind::LinUcb, 0).unwrap();
    assert_eq!(sim.injector().schedule().len(), 1);
    let mut rec = TimelineRecorder::new();
    sim.step(&mut rec).unwrap();

    let s = &rec.ticks[0];
    assert_eq!(s.corruptions.len(), 1);
    assert_eq!(s.suspect, Some(0));
    let r = &s.records[0];
    assert_eq!(r.ground_truth, 5.0);
    assert_eq!(r.sensor, 15.0);
    assert!(r.flagged);
    assert_eq!(r.chosen_distance, 5.0);
    assert_eq!(r.regret, 0.0);
    assert_eq!(r.baseline_penalty, 100.0);
    assert_eq!(r.baseline_regret, 100.0);

    let plan = sim.knowledge().plans[0];
    assert_eq!(plan.chosen_speed, plan.truth_speed);
    assert_eq!(plan.truth_speed, 2.0);
    assert_eq!(plan.sensor_speed, 12.0);
    // Acting on ground truth keeps unit 1 at cruise speed.
    assert_eq!(s.speeds[1], 2.0);
}

#[test]
fn unflagged_corruption_is_charged_as_regret() {
    // A huge threshold means nothing is ever flagged.
    let mut c = cfg(0, 1);
    c.sensor.failure_rate = 1.0;
    c.sensor.failure_range = (3.0, 3.0);
    c.learner.residual_threshold = 1.0e9;

    let mut sim =
        Simulation::new(&c, &rows(&[0.0, 5.0], 2.0), LearnerKind::LinUcb, 0).unwrap();
    let mut rec = TimelineRecorder::new();
    sim.step(&mut rec).unwrap();
    let r = &rec.ticks[0].records[0];
    assert!(!r.flagged);
    assert_eq!(r.chosen_distance, 15.0);
    assert_eq!(r.penalty, 100.0);
    assert_eq!(r.regret, 100.0);
    assert!(rec.ticks[0].speeds[1] > 2.0);
}

#[test]
fn fewer_than_two_units_fails_before_any_tick() {
    let c = cfg(0, 5);
    for initial in [rows(&[], 1.0), rows(&[3.0], 1.0)] {
        let e = Simulation::new(&c, &initial, LearnerKind::LinUcb, 0).unwrap_err();
        assert!(matches!(e, Error::TooFewUnits { .. }), "{e}");
        assert!(e.is_configuration());

        let mut rec = TimelineRecorder::new();
        assert!(run_many(&c, &initial, LearnerKind::Random, &mut rec).is_err());
        assert!(rec.ticks.is_empty());
    }
}

#[test]
fn invalid_config_fails_before_any_tick() {
    let mut c = cfg(0, 5);
    c.learner.crash_penalty = 1.0;
    let e = Simulation::new(&c, &rows(&[0.0, 5.0], 2.0), LearnerKind::LinUcb, 0).unwrap_err();
    assert!(e.to_string().contains("crash_penalty"), "{e}");
}

#[test]
fn unknown_learner_name_is_a_configuration_error() {
    let e = build_learner("greedy-oracle", 2, &SimConfig::default().learner, 0)
        .err()
        .unwrap();
    assert!(matches!(e, Error::UnknownLearner { .. }));
}

#[test]
fn same_seed_reproduces_runs() {
    let mut c = cfg(10, 60);
    c.sensor.mode = FaultMode::Random;
    c.sensor.failure_rate = 0.2;
    c.simulation.seed = 17;
    c.simulation.num_simulation_runs = 2;
    let initial = rows(&[0.0, 5.0, 10.0, 15.0], 2.0);
    for kind in LearnerKind::ALL {
        let (a, _) = run_many(&c, &initial, kind, &mut NoopObserver).unwrap();
        let (b, _) = run_many(&c, &initial, kind, &mut NoopObserver).unwrap();
        assert_eq!(a, b, "{kind}");
    }
}

#[test]
fn training_phase_never_corrupts() {
    let mut c = cfg(30, 10);
    c.sensor.mode = FaultMode::Random;
    c.sensor.failure_rate = 1.0;
    let mut rec = TimelineRecorder::new();
    let sim = Simulation::new(&c, &rows(&[0.0, 5.0, 10.0], 2.0), LearnerKind::Thompson, 0)
        .unwrap();
    let summary = sim.run(&mut rec).unwrap();
    assert_eq!(summary.ticks, 40);
    assert!(rec.ticks[..30].iter().all(|s| s.corruptions.is_empty()));
    assert!(rec.ticks[30..].iter().all(|s| s.corruptions.len() == 2));
    assert_eq!(summary.corrupted_readings, 20);
}

#[test]
fn unit_multiplier_leaves_the_run_clean() {
    let mut c = cfg(0, 30);
    c.sensor.failure_rate = 1.0;
    c.sensor.failure_range = (1.0, 1.0);
    let mut rec = TimelineRecorder::new();
    let sim = Simulation::new(&c, &rows(&[0.0, 5.0, 10.0], 2.0), LearnerKind::LinUcb, 0)
        .unwrap();
    assert_eq!(sim.injector().schedule().len(), 30);
    let summary = sim.run(&mut rec).unwrap();
    assert_eq!(summary.corrupted_readings, 0);
    assert!(rec.ticks.iter().all(|t| t.corruptions.is_empty()));
    assert_eq!(summary.total_baseline_regret, 0.0);
}
