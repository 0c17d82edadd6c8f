use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use platoon::{FaultMode, InitialState, LearnerKind, NoopObserver, SimConfig, Simulation};
use std::hint::black_box;

fn bench_ticks(c: &mut Criterion) {
    let mut cfg = SimConfig::default();
    cfg.simulation.training_iterations = 20;
    cfg.simulation.iterations = 200;
    cfg.sensor.mode = FaultMode::Random;
    cfg.sensor.failure_rate = 0.1;

    let mut group = c.benchmark_group("run_220_ticks");
    for units in [4usize, 16] {
        let rows: Vec<InitialState> = (0..units)
            .map(|i| InitialState {
                location: 5.0 * i as f64,
                speed: 2.0,
            })
            .collect();
        for kind in LearnerKind::ALL {
            group.bench_with_input(
                BenchmarkId::new(kind.name(), units),
                &rows,
                |b, rows| {
                    b.iter(|| {
                        let sim = Simulation::new(&cfg, rows, kind, 0).unwrap();
                        black_box(sim.run(&mut NoopObserver).unwrap());
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_linucb_decide(c: &mut Criterion) {
    use platoon::{Learner, LinUcb, LinUcbConfig};

    let mut group = c.benchmark_group("linucb_decide");
    for dim in [1usize, 2, 4] {
        let mut l = LinUcb::new(
            15,
            LinUcbConfig {
                dim,
                ..LinUcbConfig::default()
            },
        );
        let ctx: Vec<f64> = (0..15).map(|i| (i % 7) as f64 * 0.5).collect();
        for arm in 0..15 {
            l.update(arm, ctx[arm], ctx[arm] * ctx[arm]);
        }
        group.bench_with_input(BenchmarkId::from_parameter(dim), &ctx, |b, ctx| {
            b.iter(|| black_box(l.decide(black_box(ctx))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ticks, bench_linucb_decide);
criterion_main!(benches);
