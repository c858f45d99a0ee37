//! Per-instance tick cost.
//!
//! Run with: cargo bench -p rigmotion-animation-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::Vec3;
use rigmotion_animation_core::{Animator, AnimatorConfig, AvatarGoal};
use rigmotion_test_fixtures::builders;

fn locomotion() -> Animator {
    let mut a = Animator::new(builders::humanoid_rig(), AnimatorConfig::default());
    a.bind(
        builders::locomotion_controller().build().expect("controller builds"),
        builders::humanoid_avatar(),
    )
    .expect("humanoid binds");
    a.set_float("Speed", 0.7).expect("speed parameter");
    a
}

fn bench_humanoid_tick(c: &mut Criterion) {
    c.bench_function("humanoid_tick", |b| {
        let mut a = locomotion();
        b.iter(|| a.tick(black_box(1.0 / 60.0)));
    });
}

fn bench_humanoid_tick_with_ik(c: &mut Criterion) {
    c.bench_function("humanoid_tick_ik", |b| {
        let mut a = locomotion();
        a.set_goal_position(AvatarGoal::LeftHand, Vec3::new(0.45, 1.35, 0.15))
            .expect("goal");
        a.set_goal_position_weight(AvatarGoal::LeftHand, 1.0).expect("goal weight");
        b.iter(|| a.tick(black_box(1.0 / 60.0)));
    });
}

fn bench_generic_tick(c: &mut Criterion) {
    c.bench_function("generic_tick", |b| {
        let mut a = Animator::new(builders::generic_rig(), AnimatorConfig::default());
        a.bind(
            builders::wave_controller().build().expect("controller builds"),
            builders::generic_avatar(),
        )
        .expect("generic binds");
        b.iter(|| {
            a.tick(black_box(1.0 / 60.0));
            black_box(a.take_writes());
        });
    });
}

criterion_group!(benches, bench_humanoid_tick, bench_humanoid_tick_with_ik, bench_generic_tick);
criterion_main!(benches);
