use glam::{Quat, Vec3};
use rigmotion_animation_core::{
    name_hash, Animator, AnimatorCallbacks, AnimatorConfig, AnimatorError, AvatarGoal, AvatarTarget, BuildError,
    CullingMode, HumanBone, IkGoals, LayerDef, MatchTargetWeightMask, MotionDef, StateDef,
};
use rigmotion_test_fixtures::builders;

fn approx(a: Vec3, b: Vec3, eps: f32) -> bool {
    (a - b).length() <= eps
}

fn humanoid_with(config: AnimatorConfig) -> Animator {
    let mut a = Animator::new(builders::humanoid_rig(), config);
    a.bind(
        builders::locomotion_controller().build().expect("controller builds"),
        builders::humanoid_avatar(),
    )
    .expect("humanoid binds");
    a
}

fn humanoid() -> Animator {
    humanoid_with(AnimatorConfig::default())
}

fn node_global(a: &Animator, name: &str) -> Vec3 {
    let rig = a.rig();
    let i = rig
        .nodes()
        .iter()
        .position(|n| n.name == name)
        .unwrap_or_else(|| panic!("rig has no node {name}"));
    rig.global(i).unwrap().translation
}

/// it should move forward at the blended walk speed
#[test]
fn walking_accumulates_root_motion() {
    let mut a = humanoid();
    a.set_float("Speed", 0.5).unwrap();
    for _ in 0..40 {
        a.tick(0.05);
    }
    let p = a.root_position();
    assert!(p.z > 2.0 && p.z < 3.2, "root travelled to {p:?}");
    assert!(p.x.abs() < 1e-4 && p.y.abs() < 1e-4);
}

/// it should leave the root in place when root motion is disabled
#[test]
fn root_motion_can_be_disabled() {
    let mut a = humanoid();
    a.set_apply_root_motion(false);
    a.set_float("Speed", 1.0).unwrap();
    for _ in 0..20 {
        a.tick(0.05);
    }
    assert!(approx(a.root_position(), Vec3::ZERO, 1e-6));
}

/// it should let the host take over root motion
#[test]
fn host_can_consume_root_motion() {
    struct Sink(Vec3);
    impl AnimatorCallbacks for Sink {
        fn on_animator_move(
            &mut self,
            motion: &rigmotion_animation_core::RootMotion,
            _root: &mut rigmotion_animation_core::RootTransform,
        ) -> bool {
            self.0 += motion.delta_position;
            true
        }
    }

    let mut a = humanoid();
    let mut sink = Sink(Vec3::ZERO);
    a.set_float("Speed", 0.5).unwrap();
    for _ in 0..20 {
        a.tick_with(0.05, &mut sink);
    }
    assert!(approx(a.root_position(), Vec3::ZERO, 1e-6));
    assert!(sink.0.z > 0.5);
}

/// it should keep the root moving but freeze the rig while invisible
#[test]
fn invisible_instance_skips_pose_writes() {
    let mut a = humanoid();
    a.set_float("Speed", 1.0).unwrap();
    a.tick(0.05);
    let frozen: Vec<_> = a.rig().globals().to_vec();
    a.set_visible(false);
    for _ in 0..10 {
        a.tick(0.05);
    }
    assert!(a.root_position().z > 0.5);
    assert_eq!(a.rig().globals(), frozen.as_slice());

    a.set_visible(true);
    a.tick(0.05);
    assert_ne!(a.rig().globals(), frozen.as_slice());
}

/// it should stop evaluating entirely under CullCompletely
#[test]
fn cull_completely_freezes_state_time() {
    let mut a = humanoid_with(AnimatorConfig {
        culling: CullingMode::CullCompletely,
        ..AnimatorConfig::default()
    });
    a.tick(0.05);
    let before = a.current_state_info(0).unwrap().normalized_time;
    a.set_visible(false);
    a.tick(0.5);
    assert_eq!(a.current_state_info(0).unwrap().normalized_time, before);
}

/// it should pull the hand onto a host goal
#[test]
fn host_goal_drives_hand_ik() {
    let mut a = humanoid();
    let target = Vec3::new(0.45, 1.35, 0.15);
    a.set_goal_position(AvatarGoal::LeftHand, target).unwrap();
    a.set_goal_position_weight(AvatarGoal::LeftHand, 1.0).unwrap();
    a.tick(0.016);
    let hand = node_global(&a, "LeftHand");
    assert!(approx(hand, target, 1e-3), "hand at {hand:?}");
    assert!(approx(a.goal_position(AvatarGoal::LeftHand).unwrap(), target, 1e-6));

    // the right arm is untouched
    assert!(approx(node_global(&a, "RightHand"), Vec3::new(-0.68, 1.5, 0.0), 1e-3));

    a.clear_goal(AvatarGoal::LeftHand).unwrap();
    a.tick(0.016);
    assert!(approx(node_global(&a, "LeftHand"), Vec3::new(0.68, 1.5, 0.0), 1e-3));
}

/// it should re-solve after an IK callback moves a goal
#[test]
fn ik_callback_moves_foot() {
    struct PlantLeft {
        target: Vec3,
        layers: Vec<usize>,
    }
    impl AnimatorCallbacks for PlantLeft {
        fn on_animator_ik(&mut self, layer: usize, goals: &mut dyn IkGoals) {
            self.layers.push(layer);
            goals.set_goal_position(AvatarGoal::LeftFoot, self.target);
            goals.set_goal_position_weight(AvatarGoal::LeftFoot, 1.0);
        }
    }

    let mut a = humanoid();
    let mut cb = PlantLeft {
        target: Vec3::new(0.15, 0.2, 0.2),
        layers: Vec::new(),
    };
    a.tick_with(0.016, &mut cb);
    assert_eq!(cb.layers, [0]);
    let foot = node_global(&a, "LeftFoot");
    assert!(approx(foot, cb.target, 1e-3), "foot at {foot:?}");
}

/// it should show each IK layer the pose solved from the goals of the layers before it
#[test]
fn ik_layers_see_earlier_goals_solved() {
    struct HandOff {
        target: Vec3,
        seen: Vec<(usize, Option<Vec3>)>,
    }
    impl AnimatorCallbacks for HandOff {
        fn on_animator_ik(&mut self, layer: usize, goals: &mut dyn IkGoals) {
            self.seen.push((layer, goals.bone_position(HumanBone::LeftHand)));
            if layer == 0 {
                goals.set_goal_position(AvatarGoal::LeftHand, self.target);
                goals.set_goal_position_weight(AvatarGoal::LeftHand, 1.0);
            }
        }
    }

    let mut def = builders::locomotion_controller();
    let mut upper = LayerDef::new("Upper");
    upper.ik_pass = true;
    upper.state_machine.states = vec![StateDef::new("Idle", Some(MotionDef::Clip("Idle".into())))];
    def.add_layer(upper);
    let mut a = Animator::new(builders::humanoid_rig(), AnimatorConfig::default());
    a.bind(def.build().expect("controller builds"), builders::humanoid_avatar())
        .expect("humanoid binds");

    let mut cb = HandOff {
        target: Vec3::new(0.45, 1.35, 0.15),
        seen: Vec::new(),
    };
    a.tick_with(0.016, &mut cb);
    assert_eq!(cb.seen.len(), 2);
    let (first, rest) = cb.seen[0];
    let (second, solved) = cb.seen[1];
    assert_eq!((first, second), (0, 1));
    assert!(approx(rest.unwrap(), Vec3::new(0.68, 1.5, 0.0), 1e-3), "hand at {rest:?}");
    assert!(approx(solved.unwrap(), cb.target, 1e-3), "hand at {solved:?}");
}

/// it should land the body on the requested pose when the window closes
#[test]
fn match_target_lands_body() {
    let mut a = humanoid();
    let target = Vec3::new(0.5, 1.0, 2.0);
    let facing = Quat::from_rotation_y(0.6);
    a.match_target(
        AvatarTarget::Body,
        target,
        facing,
        MatchTargetWeightMask::default(),
        0.2,
        0.8,
    )
    .unwrap();
    assert!(a.is_matching_target());

    let mut ticks = 0;
    while a.is_matching_target() {
        a.tick(0.1);
        ticks += 1;
        assert!(ticks < 40, "match never completed");
    }
    let pose = a.human_pose().unwrap();
    let body = a.root_position() + a.root_rotation() * pose.body_position;
    assert!(approx(body, target, 1e-3), "body at {body:?}");
    let rot = (a.root_rotation() * pose.body_rotation).normalize();
    assert!(rot.angle_between(facing) < 1e-3);
}

/// it should land a moving foot on the requested point while walking
#[test]
fn match_target_lands_walking_foot() {
    let mut a = humanoid();
    a.set_float("Speed", 0.5).unwrap();
    a.play(0, name_hash("Move"), 0.0).unwrap();
    a.tick(0.05);

    let target = Vec3::new(0.3, 0.1, 1.5);
    a.match_target(
        AvatarTarget::LeftFoot,
        target,
        Quat::IDENTITY,
        MatchTargetWeightMask {
            position: Vec3::ONE,
            rotation: 0.0,
        },
        0.2,
        0.8,
    )
    .unwrap();

    let mut ticks = 0;
    while a.is_matching_target() {
        a.tick(0.05);
        ticks += 1;
        assert!(ticks < 40, "match never completed");
    }
    assert_eq!(a.current_state_info(0).unwrap().name_hash, name_hash("Move"));
    let foot = a.goal_position(AvatarGoal::LeftFoot).unwrap();
    assert!(approx(foot, target, 1e-3), "foot at {foot:?}");
}

/// it should cancel a match and optionally snap to its end
#[test]
fn interrupt_match_target() {
    let mut a = humanoid();
    let target = Vec3::new(0.0, 0.0, 3.0);
    a.match_target(
        AvatarTarget::Root,
        target,
        Quat::IDENTITY,
        MatchTargetWeightMask::default(),
        0.2,
        0.8,
    )
    .unwrap();
    a.tick(0.1);
    a.interrupt_match_target(false).unwrap();
    assert!(!a.is_matching_target());
    assert!(approx(a.root_position(), Vec3::ZERO, 1e-6));

    a.match_target(
        AvatarTarget::Root,
        target,
        Quat::IDENTITY,
        MatchTargetWeightMask::default(),
        0.8,
        0.9,
    )
    .unwrap();
    a.interrupt_match_target(true).unwrap();
    assert!(approx(a.root_position(), target, 1e-4));
}

/// it should refuse an avatar that misses a required bone
#[test]
fn missing_required_bone_refuses_bind() {
    let mut a = Animator::new(builders::humanoid_rig(), AnimatorConfig::default());
    let err = a
        .bind(
            builders::locomotion_controller().build().unwrap(),
            builders::humanoid_avatar_without(HumanBone::LeftFoot),
        )
        .unwrap_err();
    assert_eq!(err, BuildError::MissingHumanBone { bone: HumanBone::LeftFoot });
    assert!(!a.is_initialized());
    assert_eq!(a.set_float("Speed", 1.0), Err(AnimatorError::NotInitialized));
}

/// it should expose muscle values sampled from the current clip
#[test]
fn human_pose_tracks_muscles() {
    let mut a = humanoid();
    a.set_float("Speed", 0.5).unwrap();
    for _ in 0..10 {
        a.tick(0.05);
    }
    let pose = a.human_pose().unwrap();
    assert!(pose.muscles.iter().any(|m| m.abs() > 1e-3));
    assert!(approx(pose.body_position, Vec3::new(0.0, 1.0, 0.0), 1e-4));
}
