use criterion::{criterion_group, criterion_main, Criterion};
use cylflow::solver::mesh::generate_channel_with_obstacle;
use cylflow::solver::options::{PreconditionerKind, SimulationConfig};
use cylflow::solver::projection::{advance, SimulationContext};
use nalgebra::Point2;

fn solver_step_benchmark(c: &mut Criterion) {
    let mesh = generate_channel_with_obstacle(64, 32, 16.0, 8.0, Point2::new(4.0, 4.0), 0.5)
        .expect("mesh");

    let mut group = c.benchmark_group("projection_step");
    group.sample_size(20);
    for (name, preconditioner) in [
        ("amg", PreconditionerKind::Amg),
        ("jacobi", PreconditionerKind::Jacobi),
    ] {
        let mut config = SimulationConfig::default();
        config.pressure_solver.preconditioner = preconditioner;
        let mut ctx = SimulationContext::new(config, mesh.clone()).expect("context");
        // past the impulsive start
        for _ in 0..5 {
            advance(&mut ctx).expect("step");
        }
        group.bench_function(name, |b| b.iter(|| advance(&mut ctx).expect("step")));
    }
    group.finish();
}

criterion_group!(benches, solver_step_benchmark);
criterion_main!(benches);
