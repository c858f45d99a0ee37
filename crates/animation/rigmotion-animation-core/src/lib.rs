//! Rigmotion Animation Core (engine-agnostic)
//!
//! Skeletal animation evaluation for one instance at a time: parameter-driven
//! state machines, blend trees, layered blending with avatar masks, humanoid
//! muscle-space retargeting, two-bone IK, root motion, target matching and a
//! frame recorder.
//!
//! Authoring types (`ControllerDef`, `AvatarDef`, `SkeletonNodeDef`,
//! `AnimationClip`) build into immutable shared constants (`ControllerGraph`,
//! `AvatarConstant`, `SceneRig`). An [`Animator`] binds them together and owns
//! all mutable per-instance memory.

pub mod accumulate;
pub mod animator;
pub mod avatar;
pub mod binding;
pub mod blend_tree;
pub mod clip;
pub mod config;
pub mod controller;
pub mod curve;
pub mod error;
pub mod human;
pub mod ids;
pub mod ik;
pub mod inputs;
pub mod mask;
pub mod motion;
pub mod outputs;
pub mod recorder;
pub mod retarget;
pub mod sampling;
pub mod scene;
pub mod scratch;
pub mod state_machine;
pub mod target_match;
pub mod values;

// Re-exports for consumers (hosts and orchestrators)
pub use animator::{Animator, GoalState, InstanceMemory, StateInfo, TransitionInfo};
pub use avatar::{AvatarConstant, AvatarDef, HumanBoneMapping, HumanDescription};
pub use binding::{RigResolver, TargetHandle, TargetResolver};
pub use blend_tree::BlendType;
pub use clip::{AnimationClip, AnimationEvent, BoneCurves, GoalCurves, MuscleCurve, ParameterCurve, PropertyCurve, PropertyCurveKind};
pub use config::{AnimatorConfig, CullingMode, ScratchCfg};
pub use controller::{
    BlendChildDef, BlendTreeDef, ConditionDef, ControllerDef, ControllerGraph, LayerBlending, LayerDef, MotionDef,
    StateDef, StateMachineDef, TransitionDef,
};
pub use curve::{FloatCurve, Keyframe, QuatTrack, Track, Vec3Track};
pub use error::{AnimatorError, BuildError, ValueError};
pub use human::{AvatarGoal, HumanBone, HumanPose, MuscleAxis, GOAL_COUNT, HUMAN_BONE_COUNT, MUSCLE_COUNT};
pub use ids::{name_hash, BlendTreeId, ClipId, FastMap, IdAllocator, InstId, NameHash};
pub use mask::{AvatarMask, BodyPart};
pub use outputs::{AnimatorCallbacks, AnimatorEvent, IkGoals, NoCallbacks, RootMotion, RootTransform};
pub use recorder::RecorderMode;
pub use scene::{RigMode, SceneRig, SkeletonNodeDef, Transform};
pub use state_machine::ConditionMode;
pub use target_match::{AvatarTarget, MatchTargetWeightMask};
pub use values::{ParameterDef, ParameterId, ParameterType, ParameterValue};
pub use rigmotion_api_core::{Value, ValueKind};
