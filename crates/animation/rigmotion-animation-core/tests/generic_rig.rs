use glam::{Quat, Vec3};
use rigmotion_animation_core::{
    Animator, AnimatorConfig, AnimatorError, AvatarTarget, MatchTargetWeightMask, SceneRig, TargetHandle, TargetResolver,
    Value, ValueKind,
};
use rigmotion_api_core::{PropertyPath, WriteBatch};
use rigmotion_test_fixtures::builders;

fn approx(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps
}

fn wave(rig: SceneRig) -> Animator {
    let mut a = Animator::new(rig, AnimatorConfig::default());
    a.bind(
        builders::wave_controller().build().expect("controller builds"),
        builders::generic_avatar(),
    )
    .expect("generic avatar binds");
    a
}

fn write_for<'a>(batch: &'a WriteBatch, path: &str) -> Option<&'a Value> {
    batch.iter().find(|w| w.path.to_string() == path).map(|w| &w.value)
}

/// it should emit property writes with the curve's value kind
#[test]
fn property_curves_become_writes() {
    let mut a = wave(builders::generic_rig());
    for _ in 0..5 {
        a.tick(0.1);
    }
    let writes = a.take_writes();
    assert_eq!(writes.len(), 2);
    match write_for(&writes, "Body#Material.tint") {
        Some(Value::Float(v)) => assert!(approx(*v, 0.5, 1e-4), "tint {v}"),
        other => panic!("unexpected tint write {other:?}"),
    }
    assert_eq!(write_for(&writes, "Body/Arm#Renderer.visible"), Some(&Value::Bool(true)));
    assert!(a.take_writes().is_empty());
}

/// it should coerce writes to the kind a host resolver asks for and skip unresolved paths
#[test]
fn resolver_controls_bound_properties() {
    struct IntTint;
    impl TargetResolver for IntTint {
        fn resolve(&mut self, path: &PropertyPath, _hint: ValueKind) -> Option<TargetHandle> {
            (path.component == "Material").then_some(TargetHandle {
                id: 7,
                kind: ValueKind::Int,
            })
        }
    }

    let mut a = Animator::new(builders::generic_rig(), AnimatorConfig::default());
    a.bind_with(
        builders::wave_controller().build().unwrap(),
        builders::generic_avatar(),
        &mut IntTint,
    )
    .unwrap();
    for _ in 0..8 {
        a.tick(0.1);
    }
    let writes = a.take_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(write_for(&writes, "Body#Material.tint"), Some(&Value::Int(1)));
}

/// it should turn the root motion bone's translation into root motion
#[test]
fn root_motion_bone_drives_root() {
    let mut a = wave(builders::generic_rig());
    for _ in 0..5 {
        a.tick(0.1);
    }
    let p = a.root_position();
    assert!(approx(p.z, 0.5, 1e-3), "root at {p:?}");
    assert!(approx(p.y, 0.0, 1e-5));

    let rig = a.rig();
    let body = rig.find("Body").unwrap();
    assert!((rig.global(body).unwrap().translation - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
    let arm = rig.find("Body/Arm").unwrap();
    let expected = Quat::from_rotation_z(0.5);
    assert!(rig.local(arm).unwrap().rotation.angle_between(expected) < 1e-3);
}

/// it should write globals directly into an optimized rig
#[test]
fn optimized_rig_receives_globals() {
    let mut a = wave(builders::generic_rig().optimized());
    a.set_apply_root_motion(false);
    for _ in 0..5 {
        a.tick(0.1);
    }
    let rig = a.rig();
    let body = rig.find("Body").unwrap();
    let t = rig.global(body).unwrap().translation;
    assert!(approx(t.z, 0.5, 1e-3), "body at {t:?}");
}

/// it should pose a separate rig from one clip without touching the instance
#[test]
fn sample_poses_external_rig() {
    let mut a = wave(builders::generic_rig());
    a.tick(0.2);
    let before = a.current_state_info(0).unwrap();

    let graph = a.graph().unwrap().clone();
    let clip = graph.clip_id("Wave").unwrap();
    let mut scratch = builders::generic_rig();
    a.sample(clip, 0.75, &mut scratch).unwrap();
    let body = scratch.find("Body").unwrap();
    assert!(approx(scratch.global(body).unwrap().translation.z, 0.75, 1e-4));
    assert_eq!(a.current_state_info(0).unwrap(), before);

    let mut wrong = builders::humanoid_rig();
    assert_eq!(a.sample(clip, 0.5, &mut wrong), Err(AnimatorError::InvalidIndex));
}

/// it should refuse humanoid-only requests on a generic avatar
#[test]
fn humanoid_requests_are_refused() {
    let mut a = wave(builders::generic_rig());
    assert!(a.human_pose().is_none());
    let r = a.match_target(
        AvatarTarget::LeftHand,
        Vec3::ONE,
        Quat::IDENTITY,
        MatchTargetWeightMask::default(),
        0.0,
        1.0,
    );
    assert_eq!(r, Err(AnimatorError::InvalidIndex));
    assert!(a
        .match_target(
            AvatarTarget::Root,
            Vec3::ONE,
            Quat::IDENTITY,
            MatchTargetWeightMask::default(),
            0.0,
            1.0,
        )
        .is_ok());
}

/// it should reject humanoid clips on a generic avatar at bind time
#[test]
fn humanoid_controller_needs_humanoid_avatar() {
    let mut a = Animator::new(builders::generic_rig(), AnimatorConfig::default());
    let err = a
        .bind(
            builders::locomotion_controller().build().unwrap(),
            builders::generic_avatar(),
        )
        .unwrap_err();
    assert!(matches!(err, rigmotion_animation_core::BuildError::NotHumanoid { .. }));
}
