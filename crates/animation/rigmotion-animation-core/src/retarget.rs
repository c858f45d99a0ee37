//! Humanoid retargeting: muscle-space pose to skeleton locals, hips placement,
//! goal extraction and the per-goal IK pass.
//!
//! Everything here works in the rig frame (the instance root). Locals are
//! indexed like the rig; parents always precede children so a single forward
//! sweep recomputes globals.

use glam::{Quat, Vec3};

use crate::avatar::HumanConstant;
use crate::binding::AvatarBinding;
use crate::human::{AvatarGoal, GoalPose, HumanBone, HumanPose, GOAL_COUNT, HUMAN_BONE_COUNT};
use crate::ik::{self, IkTarget, LimbGlobals};
use crate::scene::Transform;

/// Globals from locals for every node.
pub fn forward(parents: &[Option<usize>], locals: &[Transform], globals: &mut [Transform]) {
    forward_from(parents, locals, globals, 0);
}

/// Globals from locals for nodes `start..`. Nodes before `start` must be current.
pub fn forward_from(parents: &[Option<usize>], locals: &[Transform], globals: &mut [Transform], start: usize) {
    for i in start..locals.len() {
        globals[i] = match parents[i] {
            Some(p) => globals[p].mul_transform(&locals[i]),
            None => locals[i],
        };
    }
}

/// Place node `i` at global `g` by rewriting its local, then refresh the
/// globals that follow it.
pub fn set_global(
    parents: &[Option<usize>],
    locals: &mut [Transform],
    globals: &mut [Transform],
    i: usize,
    g: Transform,
) {
    locals[i] = match parents[i] {
        Some(p) => globals[p].inverse().mul_transform(&g),
        None => g,
    };
    forward_from(parents, locals, globals, i);
}

/// Write human bone locals from muscle values. Each limb bone keeps its twist
/// share and passes the rest on to its twist child.
pub fn muscles_to_locals(
    human: &HumanConstant,
    binding: &AvatarBinding,
    pose: &HumanPose,
    locals: &mut [Transform],
) {
    let mut carried = [0.0f32; HUMAN_BONE_COUNT];
    for bone in HumanBone::all() {
        if bone == HumanBone::Hips {
            continue;
        }
        let Some(node) = binding.node(bone) else { continue };
        let limit = &human.limits[bone.index()];
        let m = pose.muscles_of(bone);
        let total = limit.twist_angle(m.x) + carried[bone.index()];
        let kept = match bone.twist_child() {
            Some(child) => {
                let share = human.twist_share(bone);
                carried[child.index()] += total * (1.0 - share);
                total * share
            }
            None => total,
        };
        let bind = binding.bind_locals[node];
        locals[node] = Transform {
            translation: bind.translation,
            rotation: (bind.rotation * limit.rotation_with_twist(m, kept)).normalize(),
            scale: bind.scale,
        };
    }
}

/// Position the hips from the body placement. `body_rotation` is applied on
/// top of the bind-pose hips orientation.
pub fn place_body(
    binding: &AvatarBinding,
    pose: &HumanPose,
    locals: &mut [Transform],
    globals: &mut [Transform],
) {
    let Some(hips) = binding.node(HumanBone::Hips) else { return };
    let bind = binding.bind_globals[hips];
    let g = Transform {
        translation: pose.body_position,
        rotation: (pose.body_rotation * bind.rotation).normalize(),
        scale: bind.scale,
    };
    set_global(&binding.parents, locals, globals, hips, g);
}

/// Fill goals no clip animated from the current end-effector globals.
pub fn fill_goals_from_fk(binding: &AvatarBinding, pose: &mut HumanPose, globals: &[Transform]) {
    for goal in AvatarGoal::ALL {
        let slot = &mut pose.goals[goal.index()];
        if slot.valid {
            continue;
        }
        if let Some([_, _, end]) = binding.chain(goal) {
            slot.position = globals[end].translation;
            slot.rotation = globals[end].rotation;
        }
    }
}

/// Push animated foot goals sideways by the avatar's foot spacing.
pub fn apply_feet_spacing(
    binding: &AvatarBinding,
    spacing: f32,
    body_rotation: Quat,
    goals: &mut [GoalPose; GOAL_COUNT],
) {
    if spacing == 0.0 {
        return;
    }
    let lateral = body_rotation * Vec3::X;
    for (goal, side) in [AvatarGoal::LeftFoot, AvatarGoal::RightFoot]
        .into_iter()
        .zip(binding.foot_side)
    {
        let slot = &mut goals[goal.index()];
        if slot.valid {
            slot.position += lateral * spacing * side;
        }
    }
}

/// Solve every goal with a non-zero weight. Targets are in the rig frame.
pub fn solve_goals(
    human: &HumanConstant,
    binding: &AvatarBinding,
    targets: &[IkTarget],
    locals: &mut [Transform],
    globals: &mut [Transform],
) {
    for (goal, target) in AvatarGoal::ALL.into_iter().zip(targets) {
        if target.position_weight <= 0.0 && target.rotation_weight <= 0.0 {
            continue;
        }
        let Some([a, b, c]) = binding.chain(goal) else { continue };
        let stretch = if goal.is_foot() {
            human.description.leg_stretch
        } else {
            human.description.arm_stretch
        };
        let mut limb = LimbGlobals {
            upper: globals[a],
            lower: globals[b],
            end: globals[c],
        };
        ik::solve_two_bone(&mut limb, target, stretch.max(0.0));
        let parents = &binding.parents;
        set_global(parents, locals, globals, a, limb.upper);
        set_global(parents, locals, globals, b, limb.lower);
        set_global(parents, locals, globals, c, limb.end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// it should keep globals consistent after placing a node
    #[test]
    fn set_global_updates_children() {
        let parents = [None, Some(0), Some(1)];
        let mut locals = [
            Transform::IDENTITY,
            Transform::from_translation(Vec3::Y),
            Transform::from_translation(Vec3::Y),
        ];
        let mut globals = [Transform::IDENTITY; 3];
        forward(&parents, &locals, &mut globals);
        assert!(globals[2].translation.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-6));

        let g = Transform::from_translation_rotation(Vec3::new(1.0, 1.0, 0.0), Quat::from_rotation_z(-std::f32::consts::FRAC_PI_2));
        set_global(&parents, &mut locals, &mut globals, 1, g);
        assert!(globals[1].translation.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5));
        assert!(globals[2].translation.abs_diff_eq(Vec3::new(2.0, 1.0, 0.0), 1e-5));
    }
}
