//! Target matching: bend root motion so a body part lands on a requested
//! world pose at a given normalized time of the current state.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::human::AvatarGoal;
use crate::outputs::{RootMotion, RootTransform};
use crate::scene::Transform;

/// Body part whose world pose is matched.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AvatarTarget {
    Root,
    Body,
    LeftFoot,
    RightFoot,
    LeftHand,
    RightHand,
}

impl AvatarTarget {
    pub fn goal(self) -> Option<AvatarGoal> {
        match self {
            AvatarTarget::LeftFoot => Some(AvatarGoal::LeftFoot),
            AvatarTarget::RightFoot => Some(AvatarGoal::RightFoot),
            AvatarTarget::LeftHand => Some(AvatarGoal::LeftHand),
            AvatarTarget::RightHand => Some(AvatarGoal::RightHand),
            AvatarTarget::Root | AvatarTarget::Body => None,
        }
    }
}

/// Per-axis position weights and a rotation weight, each in [0, 1].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchTargetWeightMask {
    pub position: Vec3,
    pub rotation: f32,
}

impl Default for MatchTargetWeightMask {
    fn default() -> Self {
        Self {
            position: Vec3::ONE,
            rotation: 1.0,
        }
    }
}

/// An active match request.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetMatch {
    pub target: AvatarTarget,
    pub position: Vec3,
    pub rotation: Quat,
    pub mask: MatchTargetWeightMask,
    pub start: f32,
    pub end: f32,
    /// State index on layer 0 the request was made in.
    pub state: usize,
}

impl TargetMatch {
    /// Fraction of the remaining error to remove this tick, for the window
    /// `(prev, cur]` of normalized time. `None` before the match starts.
    pub fn alpha(&self, prev: f32, cur: f32) -> Option<f32> {
        if cur < self.start {
            return None;
        }
        if cur >= self.end {
            return Some(1.0);
        }
        let from = prev.max(self.start);
        let remaining = self.end - from;
        if remaining <= f32::EPSILON {
            return Some(1.0);
        }
        Some(((cur - from) / remaining).clamp(0.0, 1.0))
    }

    pub fn is_complete(&self, cur: f32) -> bool {
        cur >= self.end
    }

    /// Correct this tick's root motion. `local` is the target's pose in the
    /// root frame after the tick's animation.
    pub fn correct(&self, root: &RootTransform, motion: &RootMotion, local: Transform, alpha: f32) -> RootMotion {
        let mut next = *root;
        next.apply(motion);

        let world_rot = next.rotation * local.rotation;
        let world_pos = next.position + next.rotation * local.translation;

        // rotation first, about the root
        let error = (self.rotation * world_rot.inverse()).normalize();
        let correction = Quat::IDENTITY.slerp(error, (alpha * self.mask.rotation).clamp(0.0, 1.0));
        next.rotation = (correction * next.rotation).normalize();
        let world_pos = next.position + correction * (world_pos - next.position);

        let delta = (self.position - world_pos) * self.mask.position * alpha;
        next.position += delta;

        let inv = root.rotation.inverse();
        RootMotion {
            delta_position: inv * (next.position - root.position),
            delta_rotation: (inv * next.rotation).normalize(),
            gravity_weight: motion.gravity_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TargetMatch {
        TargetMatch {
            target: AvatarTarget::Root,
            position: Vec3::new(1.0, 0.5, 2.0),
            rotation: Quat::from_rotation_y(0.7),
            mask: MatchTargetWeightMask::default(),
            start: 0.2,
            end: 0.8,
            state: 0,
        }
    }

    /// it should land exactly on the target by the end of the window
    #[test]
    fn converges_over_window() {
        let m = request();
        let mut root = RootTransform::default();
        let step = RootMotion {
            delta_position: Vec3::new(0.0, 0.0, 0.05),
            ..RootMotion::default()
        };
        let mut prev = 0.0;
        for i in 1..=10 {
            let cur = i as f32 * 0.1;
            let motion = match m.alpha(prev, cur) {
                Some(alpha) if prev < m.end => m.correct(&root, &step, Transform::IDENTITY, alpha),
                _ => step,
            };
            root.apply(&motion);
            if (cur - 0.8).abs() < 1e-4 {
                assert!(root.position.abs_diff_eq(m.position, 1e-4), "{:?}", root.position);
                assert!(root.rotation.abs_diff_eq(m.rotation, 1e-4));
            }
            prev = cur;
        }
    }

    #[test]
    fn alpha_waits_for_start() {
        let m = request();
        assert_eq!(m.alpha(0.0, 0.1), None);
        assert_eq!(m.alpha(0.7, 0.85), Some(1.0));
        let a = m.alpha(0.1, 0.5).unwrap();
        assert!((a - 0.5).abs() < 1e-5);
    }
}
