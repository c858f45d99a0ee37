//! Output contracts from the per-instance pipeline.
//!
//! Events are queued during the parallel evaluate stage and delivered later,
//! in a serialized drain, through `AnimatorCallbacks`. Generic property writes
//! travel separately as a `WriteBatch`.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::human::{AvatarGoal, HumanBone};
use crate::ids::NameHash;

/// Discrete signals emitted while stepping one instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AnimatorEvent {
    StateEntered {
        layer: usize,
        state: NameHash,
    },
    StateExited {
        layer: usize,
        state: NameHash,
    },
    TransitionStarted {
        layer: usize,
        from: NameHash,
        to: NameHash,
    },
    /// A clip event whose time was crossed by a leaf with non-zero weight.
    Animation {
        layer: usize,
        clip: String,
        name: String,
        payload: String,
        /// Clip-local time of the event.
        time: f32,
        /// Effective weight of the leaf that crossed it.
        weight: f32,
    },
}

/// Root motion produced by one tick, in the instance root frame.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RootMotion {
    pub delta_position: Vec3,
    pub delta_rotation: Quat,
    pub gravity_weight: f32,
}

impl Default for RootMotion {
    fn default() -> Self {
        Self {
            delta_position: Vec3::ZERO,
            delta_rotation: Quat::IDENTITY,
            gravity_weight: 1.0,
        }
    }
}

/// Accumulated world placement of an instance.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RootTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for RootTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl RootTransform {
    /// Apply a root-frame delta: the translation is rotated by the current
    /// rotation before it is added.
    pub fn apply(&mut self, motion: &RootMotion) {
        self.position += self.rotation * motion.delta_position;
        self.rotation = (self.rotation * motion.delta_rotation).normalize();
    }
}

/// Goal view handed to per-layer IK callbacks. Goal edits made by an
/// earlier IK layer are solved before the next layer's callback runs.
pub trait IkGoals {
    fn goal_position(&self, goal: AvatarGoal) -> Vec3;
    /// World position of a human bone in the pose solved so far this tick.
    fn bone_position(&self, bone: HumanBone) -> Option<Vec3>;
    fn goal_rotation(&self, goal: AvatarGoal) -> Quat;
    fn set_goal_position(&mut self, goal: AvatarGoal, position: Vec3);
    fn set_goal_rotation(&mut self, goal: AvatarGoal, rotation: Quat);
    fn set_goal_position_weight(&mut self, goal: AvatarGoal, weight: f32);
    fn set_goal_rotation_weight(&mut self, goal: AvatarGoal, weight: f32);
}

/// Host hooks invoked from the serialized stages.
pub trait AnimatorCallbacks {
    fn on_animation_event(&mut self, _event: &AnimatorEvent) {}

    /// Return true when the host applied the motion itself; otherwise the
    /// animator applies it to its own root transform.
    fn on_animator_move(&mut self, _motion: &RootMotion, _root: &mut RootTransform) -> bool {
        false
    }

    fn on_animator_ik(&mut self, _layer: usize, _goals: &mut dyn IkGoals) {}
}

/// Callbacks that do nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoCallbacks;

impl AnimatorCallbacks for NoCallbacks {}
