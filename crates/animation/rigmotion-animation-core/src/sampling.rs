//! Leaf clip sampling into a layer's accumulator.
//!
//! Model:
//! - A leaf plays one clip at an unwrapped normalized window `(prev, cur]`
//!   shifted by its cycle offset; curves are sampled at `cur`.
//! - Human curves fill a temporary `HumanPose`, mirrored when the leaf is,
//!   then add into the layer pose by the leaf weight.
//! - Root motion is the delta of the root curves (or the root motion bone)
//!   across the window, composed segment by segment over loop wraps.

use glam::{Quat, Vec3};
use rigmotion_api_core::{ObjectId, Value};

use crate::accumulate::LayerPose;
use crate::binding::AvatarBinding;
use crate::clip::{AnimationClip, PropertyCurveKind};
use crate::human::{mirror_position, mirror_rotation, muscle_index, HumanPose};
use crate::ids::ClipId;
use crate::outputs::RootMotion;
use crate::scene::Transform;

/// One leaf clip with its time window for this tick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ActiveLeaf {
    pub clip: ClipId,
    pub weight: f32,
    pub mirror: bool,
    /// Unwrapped normalized window, cycle offset included.
    pub prev: f32,
    pub cur: f32,
    pub inclusive: bool,
}

/// Where root motion comes from for one clip.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RootSource {
    /// The clip's own root curves (humanoid clips).
    Curves,
    /// Translation and rotation curves of a bound bone, by curve index.
    Bone(usize),
    None,
}

pub fn root_source(clip: &AnimationClip, clip_id: ClipId, binding: &AvatarBinding) -> RootSource {
    if clip.has_root_curves() {
        return RootSource::Curves;
    }
    let Some(node) = binding.root_motion_node else {
        return RootSource::None;
    };
    binding
        .bone_curves
        .get(clip_id.0 as usize)
        .and_then(|curves| curves.iter().position(|n| *n == Some(node)))
        .map_or(RootSource::None, RootSource::Bone)
}

fn root_at(clip: &AnimationClip, source: RootSource, t: f32) -> (Vec3, Quat) {
    match source {
        RootSource::Curves => clip.root_at(t),
        RootSource::Bone(j) => {
            let b = &clip.bones[j];
            let p = b.translation.as_ref().and_then(|c| c.sample(t)).unwrap_or(Vec3::ZERO);
            let q = b.rotation.as_ref().and_then(|c| c.sample(t)).unwrap_or(Quat::IDENTITY);
            (p, q)
        }
        RootSource::None => (Vec3::ZERO, Quat::IDENTITY),
    }
}

/// Root delta across the unwrapped window `(prev, cur]`, in the root frame
/// at `prev`.
pub fn root_delta(clip: &AnimationClip, source: RootSource, prev: f32, cur: f32) -> RootMotion {
    let mut motion = RootMotion {
        gravity_weight: clip.gravity_weight,
        ..RootMotion::default()
    };
    if source == RootSource::None || clip.duration <= 0.0 || cur == prev {
        return motion;
    }
    let d = clip.duration;
    let mut segment = |a: f32, b: f32| {
        let (pa, qa) = root_at(clip, source, a * d);
        let (pb, qb) = root_at(clip, source, b * d);
        let inv = qa.inverse();
        motion.delta_position += motion.delta_rotation * (inv * (pb - pa));
        motion.delta_rotation = (motion.delta_rotation * inv * qb).normalize();
    };
    if !clip.looping {
        segment(prev.clamp(0.0, 1.0), cur.clamp(0.0, 1.0));
        return motion;
    }
    if cur < prev {
        // playing backwards: walk the window from cur upward, then invert
        let fwd = root_delta(clip, source, cur, prev);
        let inv = fwd.delta_rotation.inverse();
        return RootMotion {
            delta_position: -(inv * fwd.delta_position),
            delta_rotation: inv,
            gravity_weight: clip.gravity_weight,
        };
    }
    let mut k = prev.floor();
    while k < cur {
        let a = (prev - k).max(0.0);
        let b = (cur - k).min(1.0);
        if b > a {
            segment(a, b);
        }
        k += 1.0;
    }
    motion
}

fn property_value(kind: PropertyCurveKind, v: f32) -> Value {
    match kind {
        PropertyCurveKind::Float => Value::Float(v),
        PropertyCurveKind::Bool => Value::Bool(v >= 0.5),
        PropertyCurveKind::ObjectRef => {
            if v >= 0.0 && v.is_finite() {
                Value::ObjectRef(Some(ObjectId(v.round() as u64)))
            } else {
                Value::ObjectRef(None)
            }
        }
    }
}

/// Inputs shared by every leaf of one tick.
pub struct SampleCtx<'a> {
    pub binding: &'a AvatarBinding,
    pub parameter_targets: &'a [Option<usize>],
    pub root_motion: bool,
}

/// Sample `clip` for `leaf` and add it into `pose`. `human` is scratch.
pub fn sample_leaf(
    ctx: &SampleCtx,
    clip: &AnimationClip,
    leaf: &ActiveLeaf,
    human: &mut HumanPose,
    pose: &mut LayerPose,
) {
    let w = leaf.weight;
    if w <= 0.0 {
        return;
    }
    let t = clip.local_time(leaf.cur);
    let clip_index = leaf.clip.0 as usize;

    if clip.is_humanoid() || !clip.goals.is_empty() {
        human.reset();
        for m in &clip.muscles {
            if let Some(v) = m.curve.sample(t) {
                human.muscles[muscle_index(m.bone, m.axis)] = v;
            }
        }
        let has_body = clip.body_position.is_some() || clip.body_rotation.is_some();
        if let Some(p) = clip.body_position.as_ref().and_then(|c| c.sample(t)) {
            human.body_position = p;
        }
        if let Some(q) = clip.body_rotation.as_ref().and_then(|c| c.sample(t)) {
            human.body_rotation = q;
        }
        for g in &clip.goals {
            let slot = &mut human.goals[g.goal.index()];
            if let (Some(p), Some(q)) = (g.position.sample(t), g.rotation.sample(t)) {
                slot.position = p;
                slot.rotation = q;
                slot.valid = true;
            }
        }
        if leaf.mirror {
            human.mirror();
        }
        if !clip.muscles.is_empty() {
            for (acc, m) in pose.muscles.iter_mut().zip(&human.muscles) {
                *acc += m * w;
            }
            pose.muscle_w += w;
        }
        if has_body {
            pose.body_position += human.body_position * w;
            pose.body_rotation.add(human.body_rotation, w);
            pose.body_w += w;
        }
        for (acc, g) in pose.goals.iter_mut().zip(&human.goals) {
            if g.valid {
                acc.position += g.position * w;
                acc.rotation.add(g.rotation, w);
                acc.w += w;
            }
        }
    }

    if let Some(nodes) = ctx.binding.bone_curves.get(clip_index) {
        for (curves, node) in clip.bones.iter().zip(nodes) {
            let Some(n) = *node else { continue };
            if ctx.root_motion && Some(n) == ctx.binding.root_motion_node {
                continue;
            }
            let bind = ctx.binding.bind_locals[n];
            let v = Transform {
                translation: curves
                    .translation
                    .as_ref()
                    .and_then(|c| c.sample(t))
                    .unwrap_or(bind.translation),
                rotation: curves
                    .rotation
                    .as_ref()
                    .and_then(|c| c.sample(t))
                    .unwrap_or(bind.rotation),
                scale: curves.scale.as_ref().and_then(|c| c.sample(t)).unwrap_or(bind.scale),
            };
            pose.bones[n].add(&v, w);
        }
    }

    if let Some(slots) = ctx.binding.property_curves.get(clip_index) {
        for (curve, slot) in clip.properties.iter().zip(slots) {
            let (Some(slot), Some(v)) = (*slot, curve.curve.sample(t)) else {
                continue;
            };
            pose.add_property(slot, &property_value(curve.kind, v), w);
        }
    }

    for (curve, target) in clip.parameters.iter().zip(ctx.parameter_targets) {
        if let (Some(idx), Some(v)) = (*target, curve.curve.sample(t)) {
            pose.add_parameter(idx, v, w);
        }
    }

    // leaves without root curves still weigh in, with an identity delta
    let source = root_source(clip, leaf.clip, ctx.binding);
    let mut m = root_delta(clip, source, leaf.prev, leaf.cur);
    if leaf.mirror {
        m.delta_position = mirror_position(m.delta_position);
        m.delta_rotation = mirror_rotation(m.delta_rotation);
    }
    pose.add_root(&m, w);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{Keyframe, Track};

    fn walking(looping: bool) -> AnimationClip {
        let mut c = AnimationClip::new("walk", 1.0, looping);
        c.root_position = Some(Track::new(vec![
            Keyframe { time: 0.0, value: Vec3::ZERO },
            Keyframe { time: 1.0, value: Vec3::new(0.0, 0.0, 2.0) },
        ]));
        c
    }

    /// it should accumulate displacement across loop wraps
    #[test]
    fn looping_delta_spans_wraps() {
        let c = walking(true);
        let m = root_delta(&c, RootSource::Curves, 0.5, 2.25);
        assert!(m.delta_position.abs_diff_eq(Vec3::new(0.0, 0.0, 3.5), 1e-4));
    }

    /// it should stop at the end of a one-shot clip
    #[test]
    fn one_shot_delta_clamps() {
        let c = walking(false);
        let m = root_delta(&c, RootSource::Curves, 0.5, 3.0);
        assert!(m.delta_position.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-4));
    }

    /// it should express deltas in the frame of the window start
    #[test]
    fn delta_is_in_local_frame() {
        let mut c = walking(false);
        c.root_rotation = Some(Track::constant(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)));
        let m = root_delta(&c, RootSource::Curves, 0.0, 0.5);
        // +Z in clip space is -X in the root's own frame after a quarter turn
        assert!(m.delta_position.abs_diff_eq(Vec3::new(-1.0, 0.0, 0.0), 1e-4), "{:?}", m.delta_position);
        assert!(m.delta_rotation.abs_diff_eq(Quat::IDENTITY, 1e-5));
    }
}
