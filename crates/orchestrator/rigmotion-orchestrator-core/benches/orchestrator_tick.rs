//! Whole-set step cost for both pools.
//!
//! Run with: cargo bench -p rigmotion-orchestrator-core

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rigmotion_orchestrator::{
    ControllerLibrary, NullHost, Orchestrator, OrchestratorConfig, ParallelFor, RayonParallel, SerialParallel,
};
use rigmotion_test_fixtures::builders;

fn crowd(n: usize, pool: Box<dyn ParallelFor>) -> Orchestrator {
    let lib = ControllerLibrary::new();
    lib.register("loco", &builders::locomotion_controller())
        .expect("controller builds");
    let mut orch = Orchestrator::with_pool(OrchestratorConfig::default(), Arc::new(lib), pool);
    for i in 0..n {
        let id = orch
            .spawn(builders::humanoid_rig(), "loco", builders::humanoid_avatar())
            .expect("humanoid spawns");
        orch.get_mut(id)
            .expect("spawned instance")
            .set_float("Speed", (i % 10) as f32 / 10.0)
            .expect("speed parameter");
    }
    orch
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("orchestrator_step");
    for n in [16usize, 128] {
        group.bench_with_input(BenchmarkId::new("rayon", n), &n, |b, &n| {
            let mut orch = crowd(n, Box::new(RayonParallel));
            b.iter(|| orch.step(black_box(1.0 / 60.0), &mut NullHost).expect("step"));
        });
        group.bench_with_input(BenchmarkId::new("serial", n), &n, |b, &n| {
            let mut orch = crowd(n, Box::new(SerialParallel));
            b.iter(|| orch.step(black_box(1.0 / 60.0), &mut NullHost).expect("step"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_step);
criterion_main!(benches);
