//! Canonical humanoid model: bones, muscle space and the skeleton-independent pose.
//!
//! Each human bone owns three muscles: twist about its local X axis and two
//! swings about Y and Z. A muscle value in [-1, 1] maps to an angle through the
//! bone's limits (negative side scales `min`, positive side scales `max`).

use std::convert::TryFrom;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::AnimatorError;
use crate::mask::BodyPart;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum HumanBone {
    Hips,
    LeftUpperLeg,
    RightUpperLeg,
    LeftLowerLeg,
    RightLowerLeg,
    LeftFoot,
    RightFoot,
    Spine,
    Chest,
    UpperChest,
    Neck,
    Head,
    LeftShoulder,
    RightShoulder,
    LeftUpperArm,
    RightUpperArm,
    LeftLowerArm,
    RightLowerArm,
    LeftHand,
    RightHand,
    LeftToes,
    RightToes,
    LeftEye,
    RightEye,
    Jaw,
    LeftThumbProximal,
    LeftThumbIntermediate,
    LeftThumbDistal,
    LeftIndexProximal,
    LeftIndexIntermediate,
    LeftIndexDistal,
    LeftMiddleProximal,
    LeftMiddleIntermediate,
    LeftMiddleDistal,
    LeftRingProximal,
    LeftRingIntermediate,
    LeftRingDistal,
    LeftLittleProximal,
    LeftLittleIntermediate,
    LeftLittleDistal,
    RightThumbProximal,
    RightThumbIntermediate,
    RightThumbDistal,
    RightIndexProximal,
    RightIndexIntermediate,
    RightIndexDistal,
    RightMiddleProximal,
    RightMiddleIntermediate,
    RightMiddleDistal,
    RightRingProximal,
    RightRingIntermediate,
    RightRingDistal,
    RightLittleProximal,
    RightLittleIntermediate,
    RightLittleDistal,
}

pub const HUMAN_BONE_COUNT: usize = 55;
pub const MUSCLE_COUNT: usize = HUMAN_BONE_COUNT * 3;

/// First finger bone; every bone from here on is a phalanx.
const FIRST_FINGER: usize = HumanBone::LeftThumbProximal as usize;
const FINGERS_PER_HAND: usize = 15;

pub const REQUIRED_BONES: [HumanBone; 15] = [
    HumanBone::Hips,
    HumanBone::Spine,
    HumanBone::Head,
    HumanBone::LeftUpperArm,
    HumanBone::RightUpperArm,
    HumanBone::LeftLowerArm,
    HumanBone::RightLowerArm,
    HumanBone::LeftHand,
    HumanBone::RightHand,
    HumanBone::LeftUpperLeg,
    HumanBone::RightUpperLeg,
    HumanBone::LeftLowerLeg,
    HumanBone::RightLowerLeg,
    HumanBone::LeftFoot,
    HumanBone::RightFoot,
];

impl HumanBone {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<HumanBone> {
        ALL_BONES.get(i).copied()
    }

    pub fn all() -> impl Iterator<Item = HumanBone> {
        ALL_BONES.iter().copied()
    }

    pub fn is_required(self) -> bool {
        REQUIRED_BONES.contains(&self)
    }

    pub fn is_finger(self) -> bool {
        self.index() >= FIRST_FINGER
    }

    /// The same bone on the other side of the body; midline bones map to themselves.
    pub fn mirrored(self) -> HumanBone {
        use HumanBone::*;
        let i = self.index();
        if i >= FIRST_FINGER {
            let j = if i < FIRST_FINGER + FINGERS_PER_HAND {
                i + FINGERS_PER_HAND
            } else {
                i - FINGERS_PER_HAND
            };
            return ALL_BONES[j];
        }
        match self {
            LeftUpperLeg => RightUpperLeg,
            RightUpperLeg => LeftUpperLeg,
            LeftLowerLeg => RightLowerLeg,
            RightLowerLeg => LeftLowerLeg,
            LeftFoot => RightFoot,
            RightFoot => LeftFoot,
            LeftShoulder => RightShoulder,
            RightShoulder => LeftShoulder,
            LeftUpperArm => RightUpperArm,
            RightUpperArm => LeftUpperArm,
            LeftLowerArm => RightLowerArm,
            RightLowerArm => LeftLowerArm,
            LeftHand => RightHand,
            RightHand => LeftHand,
            LeftToes => RightToes,
            RightToes => LeftToes,
            LeftEye => RightEye,
            RightEye => LeftEye,
            other => other,
        }
    }

    pub fn is_midline(self) -> bool {
        self.mirrored() == self
    }

    pub fn body_part(self) -> BodyPart {
        use HumanBone::*;
        let i = self.index();
        if i >= FIRST_FINGER {
            return if i < FIRST_FINGER + FINGERS_PER_HAND {
                BodyPart::LeftFingers
            } else {
                BodyPart::RightFingers
            };
        }
        match self {
            Hips | Spine | Chest | UpperChest => BodyPart::Body,
            Neck | Head | LeftEye | RightEye | Jaw => BodyPart::Head,
            LeftUpperLeg | LeftLowerLeg | LeftFoot | LeftToes => BodyPart::LeftLeg,
            RightUpperLeg | RightLowerLeg | RightFoot | RightToes => BodyPart::RightLeg,
            LeftShoulder | LeftUpperArm | LeftLowerArm | LeftHand => BodyPart::LeftArm,
            RightShoulder | RightUpperArm | RightLowerArm | RightHand => BodyPart::RightArm,
            _ => BodyPart::Body,
        }
    }

    /// Bone that receives the remainder of this bone's twist.
    pub fn twist_child(self) -> Option<HumanBone> {
        use HumanBone::*;
        match self {
            LeftUpperArm => Some(LeftLowerArm),
            RightUpperArm => Some(RightLowerArm),
            LeftLowerArm => Some(LeftHand),
            RightLowerArm => Some(RightHand),
            LeftUpperLeg => Some(LeftLowerLeg),
            RightUpperLeg => Some(RightLowerLeg),
            LeftLowerLeg => Some(LeftFoot),
            RightLowerLeg => Some(RightFoot),
            _ => None,
        }
    }
}

const ALL_BONES: [HumanBone; HUMAN_BONE_COUNT] = {
    use HumanBone::*;
    [
        Hips,
        LeftUpperLeg,
        RightUpperLeg,
        LeftLowerLeg,
        RightLowerLeg,
        LeftFoot,
        RightFoot,
        Spine,
        Chest,
        UpperChest,
        Neck,
        Head,
        LeftShoulder,
        RightShoulder,
        LeftUpperArm,
        RightUpperArm,
        LeftLowerArm,
        RightLowerArm,
        LeftHand,
        RightHand,
        LeftToes,
        RightToes,
        LeftEye,
        RightEye,
        Jaw,
        LeftThumbProximal,
        LeftThumbIntermediate,
        LeftThumbDistal,
        LeftIndexProximal,
        LeftIndexIntermediate,
        LeftIndexDistal,
        LeftMiddleProximal,
        LeftMiddleIntermediate,
        LeftMiddleDistal,
        LeftRingProximal,
        LeftRingIntermediate,
        LeftRingDistal,
        LeftLittleProximal,
        LeftLittleIntermediate,
        LeftLittleDistal,
        RightThumbProximal,
        RightThumbIntermediate,
        RightThumbDistal,
        RightIndexProximal,
        RightIndexIntermediate,
        RightIndexDistal,
        RightMiddleProximal,
        RightMiddleIntermediate,
        RightMiddleDistal,
        RightRingProximal,
        RightRingIntermediate,
        RightRingDistal,
        RightLittleProximal,
        RightLittleIntermediate,
        RightLittleDistal,
    ]
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MuscleAxis {
    Twist,
    SwingY,
    SwingZ,
}

#[inline]
pub fn muscle_index(bone: HumanBone, axis: MuscleAxis) -> usize {
    bone.index() * 3 + axis as usize
}

/// Per-bone muscle limits in degrees plus the pre-rotation that aligns
/// the muscle frame with the bone.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MuscleLimit {
    pub min: Vec3,
    pub max: Vec3,
    #[serde(default = "quat_identity")]
    pub pre_rotation: Quat,
}

fn quat_identity() -> Quat {
    Quat::IDENTITY
}

impl MuscleLimit {
    pub fn symmetric(twist: f32, swing_y: f32, swing_z: f32) -> Self {
        Self {
            min: Vec3::new(-twist, -swing_y, -swing_z),
            max: Vec3::new(twist, swing_y, swing_z),
            pre_rotation: Quat::IDENTITY,
        }
    }

    pub fn default_for(bone: HumanBone) -> Self {
        use HumanBone::*;
        match bone {
            Hips => MuscleLimit::symmetric(0.0, 0.0, 0.0),
            Spine | Chest | UpperChest => MuscleLimit::symmetric(40.0, 40.0, 40.0),
            Neck | Head => MuscleLimit::symmetric(40.0, 40.0, 40.0),
            LeftUpperLeg | RightUpperLeg => MuscleLimit::symmetric(60.0, 60.0, 90.0),
            LeftLowerLeg | RightLowerLeg => MuscleLimit {
                min: Vec3::new(-90.0, 0.0, -80.0),
                max: Vec3::new(90.0, 0.0, 80.0),
                pre_rotation: Quat::IDENTITY,
            },
            LeftFoot | RightFoot => MuscleLimit::symmetric(30.0, 20.0, 50.0),
            LeftShoulder | RightShoulder => MuscleLimit::symmetric(0.0, 15.0, 15.0),
            LeftUpperArm | RightUpperArm => MuscleLimit::symmetric(90.0, 100.0, 100.0),
            LeftLowerArm | RightLowerArm => MuscleLimit {
                min: Vec3::new(-90.0, 0.0, -80.0),
                max: Vec3::new(90.0, 0.0, 80.0),
                pre_rotation: Quat::IDENTITY,
            },
            LeftHand | RightHand => MuscleLimit::symmetric(0.0, 40.0, 80.0),
            LeftToes | RightToes => MuscleLimit::symmetric(0.0, 0.0, 50.0),
            LeftEye | RightEye => MuscleLimit::symmetric(0.0, 20.0, 10.0),
            Jaw => MuscleLimit::symmetric(0.0, 10.0, 10.0),
            _ => MuscleLimit::symmetric(0.0, 20.0, 50.0),
        }
    }

    /// Angle in radians for one axis.
    #[inline]
    fn angle(&self, axis: usize, m: f32) -> f32 {
        let m = m.clamp(-1.0, 1.0);
        let deg = if m >= 0.0 {
            m * self.max[axis]
        } else {
            -m * self.min[axis]
        };
        deg.to_radians()
    }

    /// Local rotation offset (relative to bind) for muscle values
    /// `(twist, swing_y, swing_z)`: `preQ × swing × twist × preQ⁻¹`.
    pub fn rotation(&self, muscles: Vec3) -> Quat {
        let twist = Quat::from_rotation_x(self.angle(0, muscles.x));
        let swing = Quat::from_scaled_axis(Vec3::new(
            0.0,
            self.angle(1, muscles.y),
            self.angle(2, muscles.z),
        ));
        self.pre_rotation * swing * twist * self.pre_rotation.inverse()
    }

    /// Twist angle in radians, used when redistributing twist along a limb.
    pub fn twist_angle(&self, m: f32) -> f32 {
        self.angle(0, m)
    }

    /// Like `rotation`, with the twist given directly in radians.
    pub fn rotation_with_twist(&self, muscles: Vec3, twist: f32) -> Quat {
        let swing = Quat::from_scaled_axis(Vec3::new(
            0.0,
            self.angle(1, muscles.y),
            self.angle(2, muscles.z),
        ));
        self.pre_rotation * swing * Quat::from_rotation_x(twist) * self.pre_rotation.inverse()
    }
}

/// IK goal slots, one per limb end.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AvatarGoal {
    LeftFoot,
    RightFoot,
    LeftHand,
    RightHand,
}

pub const GOAL_COUNT: usize = 4;

impl AvatarGoal {
    pub const ALL: [AvatarGoal; GOAL_COUNT] = [
        AvatarGoal::LeftFoot,
        AvatarGoal::RightFoot,
        AvatarGoal::LeftHand,
        AvatarGoal::RightHand,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Root, middle and end bone of the limb this goal drives.
    pub fn chain(self) -> [HumanBone; 3] {
        use HumanBone::*;
        match self {
            AvatarGoal::LeftFoot => [LeftUpperLeg, LeftLowerLeg, LeftFoot],
            AvatarGoal::RightFoot => [RightUpperLeg, RightLowerLeg, RightFoot],
            AvatarGoal::LeftHand => [LeftUpperArm, LeftLowerArm, LeftHand],
            AvatarGoal::RightHand => [RightUpperArm, RightLowerArm, RightHand],
        }
    }

    pub fn mirrored(self) -> AvatarGoal {
        match self {
            AvatarGoal::LeftFoot => AvatarGoal::RightFoot,
            AvatarGoal::RightFoot => AvatarGoal::LeftFoot,
            AvatarGoal::LeftHand => AvatarGoal::RightHand,
            AvatarGoal::RightHand => AvatarGoal::LeftHand,
        }
    }

    pub fn is_foot(self) -> bool {
        matches!(self, AvatarGoal::LeftFoot | AvatarGoal::RightFoot)
    }

    pub fn body_part(self) -> BodyPart {
        match self {
            AvatarGoal::LeftFoot => BodyPart::LeftFootIk,
            AvatarGoal::RightFoot => BodyPart::RightFootIk,
            AvatarGoal::LeftHand => BodyPart::LeftHandIk,
            AvatarGoal::RightHand => BodyPart::RightHandIk,
        }
    }
}

impl TryFrom<u32> for AvatarGoal {
    type Error = AnimatorError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        AvatarGoal::ALL
            .get(v as usize)
            .copied()
            .ok_or(AnimatorError::InvalidIndex)
    }
}

/// Goal placement carried by a human pose, in the instance root frame.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalPose {
    pub position: Vec3,
    pub rotation: Quat,
    /// False until a clip curve or forward kinematics provided a value.
    pub valid: bool,
}

impl Default for GoalPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            valid: false,
        }
    }
}

/// Skeleton-independent humanoid pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HumanPose {
    pub muscles: Vec<f32>,
    /// Hips position relative to the instance root.
    pub body_position: Vec3,
    pub body_rotation: Quat,
    pub goals: [GoalPose; GOAL_COUNT],
}

impl Default for HumanPose {
    fn default() -> Self {
        Self {
            muscles: vec![0.0; MUSCLE_COUNT],
            body_position: Vec3::ZERO,
            body_rotation: Quat::IDENTITY,
            goals: [GoalPose::default(); GOAL_COUNT],
        }
    }
}

/// Mirror a rotation across the root's YZ plane (x → -x).
#[inline]
pub fn mirror_rotation(q: Quat) -> Quat {
    Quat::from_xyzw(q.x, -q.y, -q.z, q.w)
}

#[inline]
pub fn mirror_position(p: Vec3) -> Vec3 {
    Vec3::new(-p.x, p.y, p.z)
}

impl HumanPose {
    pub fn reset(&mut self) {
        self.muscles.iter_mut().for_each(|m| *m = 0.0);
        self.body_position = Vec3::ZERO;
        self.body_rotation = Quat::IDENTITY;
        self.goals = [GoalPose::default(); GOAL_COUNT];
    }

    #[inline]
    pub fn muscles_of(&self, bone: HumanBone) -> Vec3 {
        let i = bone.index() * 3;
        Vec3::new(self.muscles[i], self.muscles[i + 1], self.muscles[i + 2])
    }

    /// Left/right swap. Paired bones exchange muscle values unchanged; midline
    /// bones negate their twist and their Z swing.
    pub fn mirror(&mut self) {
        let src = self.muscles.clone();
        for bone in HumanBone::all() {
            let other = bone.mirrored();
            let (d, s) = (bone.index() * 3, other.index() * 3);
            if other == bone {
                self.muscles[d] = -src[s];
                self.muscles[d + 1] = src[s + 1];
                self.muscles[d + 2] = -src[s + 2];
            } else {
                self.muscles[d..d + 3].copy_from_slice(&src[s..s + 3]);
            }
        }
        self.body_position = mirror_position(self.body_position);
        self.body_rotation = mirror_rotation(self.body_rotation);
        let goals = self.goals;
        for goal in AvatarGoal::ALL {
            let g = goals[goal.mirrored().index()];
            self.goals[goal.index()] = GoalPose {
                position: mirror_position(g.position),
                rotation: mirror_rotation(g.rotation),
                valid: g.valid,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bone_table_is_consistent() {
        for (i, bone) in HumanBone::all().enumerate() {
            assert_eq!(bone.index(), i);
            assert_eq!(bone.mirrored().mirrored(), bone);
        }
        assert_eq!(HumanBone::from_index(HUMAN_BONE_COUNT), None);
        assert_eq!(HumanBone::LeftIndexDistal.mirrored(), HumanBone::RightIndexDistal);
    }

    #[test]
    fn muscle_extremes_hit_limits() {
        let limit = MuscleLimit {
            min: Vec3::new(0.0, -20.0, 0.0),
            max: Vec3::new(0.0, 60.0, 0.0),
            pre_rotation: Quat::IDENTITY,
        };
        let up = limit.rotation(Vec3::new(0.0, 1.0, 0.0));
        let down = limit.rotation(Vec3::new(0.0, -1.0, 0.0));
        assert!(up.abs_diff_eq(Quat::from_rotation_y(60f32.to_radians()), 1e-5));
        assert!(down.abs_diff_eq(Quat::from_rotation_y(-20f32.to_radians()), 1e-5));
        assert!(limit.rotation(Vec3::ZERO).abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn goal_index_out_of_range_is_reported() {
        assert_eq!(AvatarGoal::try_from(2), Ok(AvatarGoal::LeftHand));
        assert_eq!(AvatarGoal::try_from(4), Err(AnimatorError::InvalidIndex));
    }

    #[test]
    fn mirror_swaps_sides_and_is_an_involution() {
        let mut pose = HumanPose::default();
        pose.muscles[muscle_index(HumanBone::LeftUpperArm, MuscleAxis::SwingZ)] = 0.5;
        pose.muscles[muscle_index(HumanBone::Spine, MuscleAxis::Twist)] = 0.25;
        pose.body_position = Vec3::new(0.3, 1.0, 0.0);
        let original = pose.clone();
        pose.mirror();
        assert_eq!(pose.muscles[muscle_index(HumanBone::RightUpperArm, MuscleAxis::SwingZ)], 0.5);
        assert_eq!(pose.muscles[muscle_index(HumanBone::LeftUpperArm, MuscleAxis::SwingZ)], 0.0);
        assert_eq!(pose.muscles[muscle_index(HumanBone::Spine, MuscleAxis::Twist)], -0.25);
        assert_eq!(pose.body_position.x, -0.3);
        pose.mirror();
        assert_eq!(pose, original);
    }
}
