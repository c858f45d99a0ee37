//! Programmatic rigs, avatars, clips and controllers.
//!
//! The humanoid is a 1.9 m T-pose with the hips 1 m above the root, left side
//! on +X, facing +Z.

use std::sync::Arc;

use glam::{Quat, Vec3};
use rigmotion_animation_core::{
    AnimationClip, AnimationEvent, AvatarConstant, AvatarDef, BlendChildDef, BlendType, BlendTreeDef, BoneCurves, ConditionDef,
    ConditionMode, ControllerDef, HumanBone, HumanBoneMapping, HumanDescription, Keyframe, LayerDef, MotionDef, MuscleAxis,
    MuscleCurve, ParameterCurve, ParameterDef, ParameterType, PropertyCurve, PropertyCurveKind, SceneRig,
    SkeletonNodeDef, StateDef, Track, Transform, TransitionDef,
};
use rigmotion_api_core::PropertyPath;

fn node(name: &str, parent: usize, offset: [f32; 3]) -> SkeletonNodeDef {
    SkeletonNodeDef::new(name, Some(parent), Transform::from_translation(Vec3::from(offset)))
}

/// Skeleton nodes named after the human bones they carry.
pub fn humanoid_skeleton() -> Vec<SkeletonNodeDef> {
    let mut nodes = vec![SkeletonNodeDef::new("Armature", None, Transform::IDENTITY)];
    let mut push = |n: SkeletonNodeDef| {
        nodes.push(n);
        nodes.len() - 1
    };
    let hips = push(node("Hips", 0, [0.0, 1.0, 0.0]));
    let spine = push(node("Spine", hips, [0.0, 0.1, 0.0]));
    let chest = push(node("Chest", spine, [0.0, 0.2, 0.0]));
    let neck = push(node("Neck", chest, [0.0, 0.25, 0.0]));
    push(node("Head", neck, [0.0, 0.1, 0.0]));
    for (side, x) in [("Left", 1.0f32), ("Right", -1.0)] {
        let shoulder = push(node(&format!("{side}Shoulder"), chest, [0.05 * x, 0.2, 0.0]));
        let upper = push(node(&format!("{side}UpperArm"), shoulder, [0.1 * x, 0.0, 0.0]));
        let lower = push(node(&format!("{side}LowerArm"), upper, [0.28 * x, 0.0, 0.0]));
        push(node(&format!("{side}Hand"), lower, [0.25 * x, 0.0, 0.0]));
    }
    for (side, x) in [("Left", 1.0f32), ("Right", -1.0)] {
        let upper = push(node(&format!("{side}UpperLeg"), hips, [0.1 * x, -0.05, 0.0]));
        let lower = push(node(&format!("{side}LowerLeg"), upper, [0.0, -0.45, 0.0]));
        push(node(&format!("{side}Foot"), lower, [0.0, -0.45, 0.0]));
    }
    nodes
}

pub fn humanoid_bones() -> Vec<HumanBone> {
    use HumanBone::*;
    vec![
        Hips,
        Spine,
        Chest,
        Neck,
        Head,
        LeftShoulder,
        LeftUpperArm,
        LeftLowerArm,
        LeftHand,
        RightShoulder,
        RightUpperArm,
        RightLowerArm,
        RightHand,
        LeftUpperLeg,
        LeftLowerLeg,
        LeftFoot,
        RightUpperLeg,
        RightLowerLeg,
        RightFoot,
    ]
}

/// Humanoid avatar definition with every skeleton node mapped.
pub fn humanoid_avatar_def() -> AvatarDef {
    let bones = humanoid_bones()
        .into_iter()
        .map(|bone| HumanBoneMapping {
            bone,
            node: format!("{bone:?}"),
            limit: None,
        })
        .collect();
    AvatarDef {
        name: "humanoid".into(),
        skeleton: humanoid_skeleton(),
        human: Some(HumanDescription {
            bones,
            ..HumanDescription::default()
        }),
        root_motion_bone: None,
    }
}

pub fn humanoid_avatar() -> Arc<AvatarConstant> {
    AvatarConstant::build(&humanoid_avatar_def()).expect("humanoid fixture avatar builds")
}

/// Humanoid avatar whose description lacks `missing`.
pub fn humanoid_avatar_without(missing: HumanBone) -> Arc<AvatarConstant> {
    let mut def = humanoid_avatar_def();
    if let Some(desc) = def.human.as_mut() {
        desc.bones.retain(|m| m.bone != missing);
    }
    AvatarConstant::build(&def).expect("humanoid fixture avatar builds")
}

pub fn humanoid_rig() -> SceneRig {
    SceneRig::new(&humanoid_skeleton()).expect("humanoid fixture rig builds")
}

/// Root, a body that carries root motion, and a two-bone arm.
pub fn generic_skeleton() -> Vec<SkeletonNodeDef> {
    vec![
        SkeletonNodeDef::new("Root", None, Transform::IDENTITY),
        node("Body", 0, [0.0, 1.0, 0.0]),
        node("Arm", 1, [0.2, 0.3, 0.0]),
        node("Hand", 2, [0.3, 0.0, 0.0]),
    ]
}

pub fn generic_avatar() -> Arc<AvatarConstant> {
    let def = AvatarDef {
        name: "generic".into(),
        skeleton: generic_skeleton(),
        human: None,
        root_motion_bone: Some("Body".into()),
    };
    AvatarConstant::build(&def).expect("generic fixture avatar builds")
}

pub fn generic_rig() -> SceneRig {
    SceneRig::new(&generic_skeleton()).expect("generic fixture rig builds")
}

fn muscle(bone: HumanBone, axis: MuscleAxis, duration: f32, a: f32, b: f32) -> MuscleCurve {
    MuscleCurve {
        bone,
        axis,
        curve: Track::linear(duration, a, b),
    }
}

/// Looping humanoid clip moving forward at `speed` m/s with a leg swing.
pub fn locomotion_clip(name: &str, duration: f32, speed: f32, swing: f32) -> AnimationClip {
    let mut clip = AnimationClip::new(name, duration, true);
    clip.muscles = vec![
        muscle(HumanBone::LeftUpperLeg, MuscleAxis::SwingZ, duration, swing, -swing),
        muscle(HumanBone::RightUpperLeg, MuscleAxis::SwingZ, duration, -swing, swing),
        muscle(HumanBone::Spine, MuscleAxis::SwingZ, duration, 0.1 * swing, 0.1 * swing),
    ];
    clip.body_position = Some(Track::constant(Vec3::new(0.0, 1.0, 0.0)));
    clip.body_rotation = Some(Track::constant(Quat::IDENTITY));
    clip.root_position = Some(Track::linear(duration, Vec3::ZERO, Vec3::new(0.0, 0.0, speed * duration)));
    clip
}

pub fn idle_clip() -> AnimationClip {
    let mut clip = locomotion_clip("Idle", 2.0, 0.0, 0.0);
    clip.root_position = None;
    clip
}

pub fn walk_clip() -> AnimationClip {
    let mut clip = locomotion_clip("Walk", 1.0, 1.5, 0.4);
    clip.events = vec![
        AnimationEvent {
            time: 0.25,
            name: "Footstep".into(),
            payload: "left".into(),
        },
        AnimationEvent {
            time: 0.75,
            name: "Footstep".into(),
            payload: "right".into(),
        },
    ];
    clip
}

pub fn run_clip() -> AnimationClip {
    locomotion_clip("Run", 0.7, 4.0, 0.8)
}

/// One-shot jump that drives the `GravityWeight` parameter.
pub fn jump_clip() -> AnimationClip {
    let mut clip = locomotion_clip("Jump", 1.0, 1.0, 0.2);
    clip.looping = false;
    clip.body_position = Some(Track::new(vec![
        Keyframe {
            time: 0.0,
            value: Vec3::new(0.0, 1.0, 0.0),
        },
        Keyframe {
            time: 0.5,
            value: Vec3::new(0.0, 1.5, 0.0),
        },
        Keyframe {
            time: 1.0,
            value: Vec3::new(0.0, 1.0, 0.0),
        },
    ]));
    clip.parameters = vec![ParameterCurve {
        name: "GravityWeight".into(),
        curve: Track::linear(1.0, 0.0, 1.0),
    }];
    clip
}

/// Idle, a 1D Speed blend of idle/walk/run, and a trigger-driven jump.
pub fn locomotion_controller() -> ControllerDef {
    let mut def = ControllerDef::new("locomotion");
    def.parameters = vec![
        ParameterDef::new("Speed", ParameterType::Float, 0.0),
        ParameterDef::new("Jump", ParameterType::Trigger, 0.0),
        ParameterDef::new("Grounded", ParameterType::Bool, 1.0),
        ParameterDef::new("GravityWeight", ParameterType::Float, 1.0),
    ];
    def.clips = vec![idle_clip(), walk_clip(), run_clip(), jump_clip()];
    def.blend_trees = vec![BlendTreeDef::new("Move", BlendType::Simple1D, "Speed")
        .with_child(BlendChildDef::at_threshold(MotionDef::Clip("Idle".into()), 0.0))
        .with_child(BlendChildDef::at_threshold(MotionDef::Clip("Walk".into()), 0.5))
        .with_child(BlendChildDef::at_threshold(MotionDef::Clip("Run".into()), 1.0))];

    let mut base = LayerDef::new("Base");
    base.ik_pass = true;
    base.state_machine.states = vec![
        StateDef::new("Idle", Some(MotionDef::Clip("Idle".into()))).with_transition(
            TransitionDef::to("Move")
                .when(ConditionDef::new(ConditionMode::Greater, "Speed", 0.1))
                .over(0.2),
        ),
        StateDef::new("Move", Some(MotionDef::BlendTree("Move".into()))).with_transition(
            TransitionDef::to("Idle")
                .when(ConditionDef::new(ConditionMode::Less, "Speed", 0.1))
                .over(0.2),
        ),
        StateDef::new("Jump", Some(MotionDef::Clip("Jump".into())))
            .with_transition(TransitionDef::to("Idle").when(ConditionDef::exit_time(0.9)).over(0.1)),
    ];
    base.state_machine.any_state = vec![TransitionDef::to("Jump")
        .when(ConditionDef::new(ConditionMode::If, "Jump", 0.0))
        .when(ConditionDef::new(ConditionMode::If, "Grounded", 0.0))
        .over(0.1)];
    def.add_layer(base);
    def
}

/// Two looping 1 s states; `A` leaves for `B` on exit time only.
pub fn exit_time_controller(exit: f32) -> ControllerDef {
    let mut def = ControllerDef::new("exit-time");
    let mut a = AnimationClip::new("A", 1.0, true);
    a.bones = vec![BoneCurves {
        path: "Body/Arm".into(),
        translation: None,
        rotation: Some(Track::linear(1.0, Quat::IDENTITY, Quat::from_rotation_z(0.5))),
        scale: None,
    }];
    let b = AnimationClip::new("B", 1.0, true);
    def.clips = vec![a, b];
    let mut layer = LayerDef::new("Base");
    layer.state_machine.states = vec![
        StateDef::new("A", Some(MotionDef::Clip("A".into())))
            .with_transition(TransitionDef::to("B").when(ConditionDef::exit_time(exit))),
        StateDef::new("B", Some(MotionDef::Clip("B".into()))),
    ];
    def.add_layer(layer);
    def
}

/// Generic clip: body moves forward, the arm waves, and a material property
/// plus a visibility flag are animated.
pub fn wave_clip() -> AnimationClip {
    let mut clip = AnimationClip::new("Wave", 1.0, true);
    clip.bones = vec![
        BoneCurves {
            path: "Body".into(),
            translation: Some(Track::linear(1.0, Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 1.0))),
            rotation: None,
            scale: None,
        },
        BoneCurves {
            path: "Body/Arm".into(),
            translation: None,
            rotation: Some(Track::linear(1.0, Quat::IDENTITY, Quat::from_rotation_z(1.0))),
            scale: None,
        },
    ];
    clip.properties = vec![
        PropertyCurve {
            path: PropertyPath::parse("Body#Material.tint").expect("fixture path parses"),
            kind: PropertyCurveKind::Float,
            curve: Track::linear(1.0, 0.0, 1.0),
        },
        PropertyCurve {
            path: PropertyPath::parse("Body/Arm#Renderer.visible").expect("fixture path parses"),
            kind: PropertyCurveKind::Bool,
            curve: Track::constant(1.0),
        },
    ];
    clip
}

pub fn wave_controller() -> ControllerDef {
    let mut def = ControllerDef::new("wave");
    def.clips = vec![wave_clip()];
    let mut layer = LayerDef::new("Base");
    layer.state_machine.states = vec![StateDef::new("Wave", Some(MotionDef::Clip("Wave".into())))];
    def.add_layer(layer);
    def
}
