//! Analytic two-bone IK on global transforms.
//!
//! The limb is solved in two rotations: the middle joint bends until the
//! upper-to-end distance matches the (clamped) target distance, then the
//! whole chain swings around the upper joint to aim at the target. The end
//! rotation blends toward the goal rotation separately.

use glam::{Quat, Vec3};

use crate::scene::Transform;

const EPS: f32 = 1e-5;

/// Global transforms of one limb: upper joint, middle joint and end effector.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LimbGlobals {
    pub upper: Transform,
    pub lower: Transform,
    pub end: Transform,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IkTarget {
    pub position: Vec3,
    pub rotation: Quat,
    pub position_weight: f32,
    pub rotation_weight: f32,
}

/// Solve `limb` toward `target` in place. `stretch` is the fraction the limb
/// may lengthen by when the target is out of reach.
pub fn solve_two_bone(limb: &mut LimbGlobals, target: &IkTarget, stretch: f32) {
    let pw = target.position_weight.clamp(0.0, 1.0);
    let rw = target.rotation_weight.clamp(0.0, 1.0);

    if pw > 0.0 {
        let a = limb.upper.translation;
        let t = limb.end.translation.lerp(target.position, pw);

        let mut b = limb.lower.translation;
        let mut c = limb.end.translation;
        let mut lab = (b - a).length();
        let mut lcb = (c - b).length();
        if lab > EPS && lcb > EPS {
            let reach = lab + lcb;
            let dist = (t - a).length();
            if dist > reach && stretch > 0.0 {
                let s = (dist / reach).min(1.0 + stretch);
                let new_b = a + (b - a) * s;
                c = new_b + (c - b) * s;
                b = new_b;
                lab *= s;
                lcb *= s;
            }

            let d = (t - a).length().clamp(EPS, (lab + lcb) * (1.0 - EPS));

            // bend at the middle joint
            let cos_current = (a - b).normalize().dot((c - b).normalize()).clamp(-1.0, 1.0);
            let cos_desired = ((lab * lab + lcb * lcb - d * d) / (2.0 * lab * lcb)).clamp(-1.0, 1.0);
            let delta = cos_desired.acos() - cos_current.acos();
            let axis = bend_axis(a - b, c - b, limb.upper.rotation);
            let knee = Quat::from_axis_angle(axis, delta);
            c = b + knee * (c - b);

            // swing toward the target
            let from = (c - a).normalize_or_zero();
            let to = (t - a).normalize_or_zero();
            let aim = if from == Vec3::ZERO || to == Vec3::ZERO {
                Quat::IDENTITY
            } else {
                Quat::from_rotation_arc(from, to)
            };

            limb.upper.rotation = (aim * limb.upper.rotation).normalize();
            limb.lower.translation = a + aim * (b - a);
            limb.lower.rotation = (aim * knee * limb.lower.rotation).normalize();
            limb.end.translation = a + aim * (c - a);
            limb.end.rotation = (aim * knee * limb.end.rotation).normalize();
        }
    }

    if rw > 0.0 {
        limb.end.rotation = limb.end.rotation.slerp(target.rotation, rw);
    }
}

fn bend_axis(to_upper: Vec3, to_end: Vec3, upper_rotation: Quat) -> Vec3 {
    let n = to_upper.cross(to_end);
    if n.length_squared() > EPS * EPS {
        return n.normalize();
    }
    // straight limb: bend around the upper bone's local X when it is usable
    let hint = upper_rotation * Vec3::X;
    let dir = to_end.normalize_or_zero();
    let projected = hint - dir * hint.dot(dir);
    if projected.length_squared() > EPS {
        projected.normalize()
    } else {
        dir.any_orthonormal_vector()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bent_leg() -> LimbGlobals {
        LimbGlobals {
            upper: Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
            lower: Transform::from_translation(Vec3::new(0.0, 0.5, 0.05)),
            end: Transform::from_translation(Vec3::new(0.0, 0.0, 0.0)),
        }
    }

    fn goal(position: Vec3) -> IkTarget {
        IkTarget {
            position,
            rotation: Quat::IDENTITY,
            position_weight: 1.0,
            rotation_weight: 0.0,
        }
    }

    /// it should place the end effector on a reachable target and keep bone lengths
    #[test]
    fn reaches_reachable_target() {
        let mut limb = bent_leg();
        let upper_len = (limb.lower.translation - limb.upper.translation).length();
        let lower_len = (limb.end.translation - limb.lower.translation).length();
        let target = Vec3::new(0.2, 0.3, 0.2);
        solve_two_bone(&mut limb, &goal(target), 0.0);
        assert!(limb.end.translation.abs_diff_eq(target, 1e-3), "{:?}", limb.end.translation);
        assert!(((limb.lower.translation - limb.upper.translation).length() - upper_len).abs() < 1e-4);
        assert!(((limb.end.translation - limb.lower.translation).length() - lower_len).abs() < 1e-4);
    }

    /// it should extend toward an unreachable target without stretching
    #[test]
    fn unreachable_target_extends_along_direction() {
        let mut limb = bent_leg();
        let target = Vec3::new(0.0, -5.0, 0.0);
        solve_two_bone(&mut limb, &goal(target), 0.0);
        let dir = (limb.end.translation - limb.upper.translation).normalize();
        assert!(dir.abs_diff_eq(Vec3::NEG_Y, 1e-3));
    }

    /// it should lengthen the limb up to the stretch allowance
    #[test]
    fn stretch_extends_reach() {
        let mut limb = bent_leg();
        let reach = (limb.lower.translation - limb.upper.translation).length()
            + (limb.end.translation - limb.lower.translation).length();
        let target = Vec3::new(0.0, 1.0 - reach * 1.05, 0.0);
        solve_two_bone(&mut limb, &goal(target), 0.1);
        assert!(limb.end.translation.abs_diff_eq(target, 1e-2));
    }

    /// it should leave positions alone when only the rotation weight is set
    #[test]
    fn rotation_weight_only_turns_end() {
        let mut limb = bent_leg();
        let before = limb;
        let r = Quat::from_rotation_y(1.0);
        solve_two_bone(
            &mut limb,
            &IkTarget {
                position: Vec3::splat(3.0),
                rotation: r,
                position_weight: 0.0,
                rotation_weight: 1.0,
            },
            0.0,
        );
        assert_eq!(limb.end.translation, before.end.translation);
        assert!(limb.end.rotation.abs_diff_eq(r, 1e-5));
    }
}
