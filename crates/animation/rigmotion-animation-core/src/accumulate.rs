//! Accumulation of weighted leaf contributions and layer blending.
//!
//! Each layer gathers its leaves into a `LayerPose` of weighted sums, which
//! `finish` normalizes. Layers are then folded into the output pose in order:
//! override layers interpolate toward their pose by the layer weight, additive
//! layers add their offset from the neutral pose. Masks restrict both.

use glam::{Quat, Vec3, Vec4};
use rigmotion_api_core::blend::{add_values, blend_values};
use rigmotion_api_core::Value;

use crate::controller::LayerBlending;
use crate::human::{AvatarGoal, HumanBone, GOAL_COUNT, MUSCLE_COUNT};
use crate::ids::NameHash;
use crate::mask::{AvatarMask, BodyPart};
use crate::outputs::RootMotion;
use crate::scene::Transform;

/// Weighted quaternion sum, kept on the hemisphere of the first sample.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct QuatAccum {
    sum: Vec4,
    w: f32,
}

impl Default for QuatAccum {
    fn default() -> Self {
        Self {
            sum: Vec4::ZERO,
            w: 0.0,
        }
    }
}

impl QuatAccum {
    pub fn add(&mut self, q: Quat, w: f32) {
        let v = Vec4::from(q);
        let v = if self.w > 0.0 && self.sum.dot(v) < 0.0 { -v } else { v };
        self.sum += v * w;
        self.w += w;
    }

    pub fn get(&self) -> Option<Quat> {
        let len = self.sum.length();
        if self.w > 0.0 && len > f32::EPSILON {
            Some(Quat::from_vec4(self.sum / len))
        } else {
            None
        }
    }
}

/// Weighted translation / rotation / scale sums for one node.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TrsAccum {
    t: Vec3,
    r: QuatAccum,
    s: Vec3,
    w: f32,
}

impl TrsAccum {
    pub fn add(&mut self, v: &Transform, w: f32) {
        self.t += v.translation * w;
        self.r.add(v.rotation, w);
        self.s += v.scale * w;
        self.w += w;
    }

    #[inline]
    pub fn weight(&self) -> f32 {
        self.w
    }

    pub fn get(&self) -> Option<Transform> {
        if self.w <= 0.0 {
            return None;
        }
        Some(Transform {
            translation: self.t / self.w,
            rotation: self.r.get().unwrap_or(Quat::IDENTITY),
            scale: self.s / self.w,
        })
    }

    pub fn set(&mut self, v: &Transform) {
        *self = TrsAccum::default();
        self.add(v, 1.0);
    }
}

/// Generic property sums. Floats average; step kinds keep the value with the
/// largest weight.
#[derive(Clone, Debug, PartialEq)]
pub enum AccumEntry {
    Scalar { sum: f32, w: f32 },
    Step { value: Value, w: f32 },
}

impl AccumEntry {
    fn from_value(v: &Value, w: f32) -> Self {
        match v {
            Value::Float(x) => AccumEntry::Scalar { sum: x * w, w },
            other => AccumEntry::Step {
                value: other.clone(),
                w,
            },
        }
    }

    fn add_value(&mut self, v: &Value, weight: f32) {
        match (self, v) {
            (AccumEntry::Scalar { sum, w }, Value::Float(x)) => {
                *sum += x * weight;
                *w += weight;
            }
            (AccumEntry::Step { value, w }, other) if !matches!(other, Value::Float(_)) => {
                if weight > *w {
                    *value = other.clone();
                    *w = weight;
                }
            }
            // mismatched kinds are ignored
            _ => {}
        }
    }

    pub fn finalize(&self) -> Option<Value> {
        match self {
            AccumEntry::Scalar { sum, w } if *w > 0.0 => Some(Value::Float(sum / w)),
            AccumEntry::Scalar { .. } => None,
            AccumEntry::Step { value, .. } => Some(value.clone()),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GoalAccum {
    pub position: Vec3,
    pub rotation: QuatAccum,
    pub w: f32,
}

/// Pose contributions of one layer (or, once blended, of the whole instance).
#[derive(Clone, Debug, PartialEq)]
pub struct LayerPose {
    pub muscles: Vec<f32>,
    pub muscle_w: f32,
    pub body_position: Vec3,
    pub body_rotation: QuatAccum,
    pub body_w: f32,
    pub goals: [GoalAccum; GOAL_COUNT],
    pub bones: Vec<TrsAccum>,
    pub properties: Vec<Option<AccumEntry>>,
    pub parameters: Vec<(f32, f32)>,
    pub root_dp: Vec3,
    pub root_dr: QuatAccum,
    pub gravity: f32,
    pub root_w: f32,
}

impl LayerPose {
    pub fn new(nodes: usize, properties: usize, parameters: usize) -> Self {
        Self {
            muscles: vec![0.0; MUSCLE_COUNT],
            muscle_w: 0.0,
            body_position: Vec3::ZERO,
            body_rotation: QuatAccum::default(),
            body_w: 0.0,
            goals: [GoalAccum::default(); GOAL_COUNT],
            bones: vec![TrsAccum::default(); nodes],
            properties: vec![None; properties],
            parameters: vec![(0.0, 0.0); parameters],
            root_dp: Vec3::ZERO,
            root_dr: QuatAccum::default(),
            gravity: 0.0,
            root_w: 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.muscles.iter_mut().for_each(|m| *m = 0.0);
        self.muscle_w = 0.0;
        self.body_position = Vec3::ZERO;
        self.body_rotation = QuatAccum::default();
        self.body_w = 0.0;
        self.goals = [GoalAccum::default(); GOAL_COUNT];
        self.bones.iter_mut().for_each(|b| *b = TrsAccum::default());
        self.properties.iter_mut().for_each(|p| *p = None);
        self.parameters.iter_mut().for_each(|p| *p = (0.0, 0.0));
        self.root_dp = Vec3::ZERO;
        self.root_dr = QuatAccum::default();
        self.gravity = 0.0;
        self.root_w = 0.0;
    }

    pub fn add_property(&mut self, slot: usize, value: &Value, w: f32) {
        if w <= 0.0 {
            return;
        }
        if let Some(entry) = self.properties.get_mut(slot) {
            match entry {
                Some(e) => e.add_value(value, w),
                None => *entry = Some(AccumEntry::from_value(value, w)),
            }
        }
    }

    pub fn add_parameter(&mut self, index: usize, value: f32, w: f32) {
        if let Some((sum, ww)) = self.parameters.get_mut(index) {
            *sum += value * w;
            *ww += w;
        }
    }

    pub fn add_root(&mut self, motion: &RootMotion, w: f32) {
        self.root_dp += motion.delta_position * w;
        self.root_dr.add(motion.delta_rotation, w);
        self.gravity += motion.gravity_weight * w;
        self.root_w += w;
    }

    /// Normalize every sum by its accumulated weight.
    pub fn finish(&mut self) {
        if self.muscle_w > 0.0 {
            let w = self.muscle_w;
            self.muscles.iter_mut().for_each(|m| *m /= w);
            self.muscle_w = 1.0;
        }
        if self.body_w > 0.0 {
            self.body_position /= self.body_w;
            self.body_w = 1.0;
        }
        for g in &mut self.goals {
            if g.w > 0.0 {
                g.position /= g.w;
                g.w = 1.0;
            }
        }
        for b in &mut self.bones {
            if let Some(t) = b.get() {
                b.set(&t);
            }
        }
        for (sum, w) in &mut self.parameters {
            if *w > 0.0 {
                *sum /= *w;
                *w = 1.0;
            }
        }
        if self.root_w > 0.0 {
            self.root_dp /= self.root_w;
            self.gravity /= self.root_w;
            self.root_w = 1.0;
        }
    }

    pub fn root_motion(&self) -> RootMotion {
        if self.root_w <= 0.0 {
            return RootMotion::default();
        }
        RootMotion {
            delta_position: self.root_dp,
            delta_rotation: self.root_dr.get().unwrap_or(Quat::IDENTITY),
            gravity_weight: self.gravity,
        }
    }
}

/// Node data the layer blend needs: path hashes for masks and bind locals as
/// the neutral pose.
pub struct BlendRig<'a> {
    pub paths: &'a [NameHash],
    pub bind: &'a [Transform],
}

/// Fold a finished `layer` into the finished `out` pose.
pub fn blend_layer(
    out: &mut LayerPose,
    layer: &LayerPose,
    weight: f32,
    blending: LayerBlending,
    mask: Option<&AvatarMask>,
    rig: &BlendRig,
) {
    if weight <= 0.0 {
        return;
    }
    let allows = |part: BodyPart| mask.map_or(true, |m| m.allows(part));
    let additive = blending == LayerBlending::Additive;

    if layer.muscle_w > 0.0 {
        for bone in HumanBone::all() {
            if !allows(bone.body_part()) {
                continue;
            }
            let i = bone.index() * 3;
            for k in i..i + 3 {
                let (base, v) = (out.muscles[k], layer.muscles[k]);
                out.muscles[k] = if additive { base + v * weight } else { base + (v - base) * weight };
            }
        }
        out.muscle_w = 1.0;
    }

    if layer.body_w > 0.0 && allows(BodyPart::Body) && !additive {
        let rot = layer.body_rotation.get().unwrap_or(Quat::IDENTITY);
        if out.body_w > 0.0 {
            let base_rot = out.body_rotation.get().unwrap_or(Quat::IDENTITY);
            out.body_position = out.body_position.lerp(layer.body_position, weight);
            out.body_rotation = single(base_rot.slerp(rot, weight));
        } else {
            out.body_position = layer.body_position;
            out.body_rotation = single(rot);
        }
        out.body_w = 1.0;
    }

    for goal in AvatarGoal::ALL {
        let src = &layer.goals[goal.index()];
        if src.w <= 0.0 || !allows(goal.body_part()) || additive {
            continue;
        }
        let dst = &mut out.goals[goal.index()];
        let rot = src.rotation.get().unwrap_or(Quat::IDENTITY);
        if dst.w > 0.0 {
            let base_rot = dst.rotation.get().unwrap_or(Quat::IDENTITY);
            dst.position = dst.position.lerp(src.position, weight);
            dst.rotation = single(base_rot.slerp(rot, weight));
        } else {
            dst.position = src.position;
            dst.rotation = single(rot);
        }
        dst.w = 1.0;
    }

    for (i, src) in layer.bones.iter().enumerate() {
        let Some(v) = src.get() else { continue };
        if let Some(m) = mask {
            if !m.allows_path(rig.paths[i]) {
                continue;
            }
        }
        let bind = rig.bind[i];
        let base = out.bones[i].get().unwrap_or(bind);
        let blended = if additive {
            let offset = bind.rotation.inverse() * v.rotation;
            Transform {
                translation: base.translation + (v.translation - bind.translation) * weight,
                rotation: (base.rotation * Quat::IDENTITY.slerp(offset, weight)).normalize(),
                scale: base.scale,
            }
        } else {
            Transform {
                translation: base.translation.lerp(v.translation, weight),
                rotation: base.rotation.slerp(v.rotation, weight),
                scale: base.scale.lerp(v.scale, weight),
            }
        };
        out.bones[i].set(&blended);
    }

    for (slot, entry) in layer.properties.iter().enumerate() {
        let Some(v) = entry.as_ref().and_then(AccumEntry::finalize) else {
            continue;
        };
        let merged = match out.properties[slot].as_ref().and_then(AccumEntry::finalize) {
            Some(base) if additive => add_values(&base, &v, &Value::neutral_of(v.kind()), weight),
            Some(base) => blend_values(&base, &v, weight),
            None => v,
        };
        out.properties[slot] = Some(AccumEntry::from_value(&merged, 1.0));
    }

    for (i, &(v, w)) in layer.parameters.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        let (base, bw) = out.parameters[i];
        out.parameters[i] = if bw <= 0.0 {
            (v, 1.0)
        } else if additive {
            (base + v * weight, 1.0)
        } else {
            (base + (v - base) * weight, 1.0)
        };
    }

    if layer.root_w > 0.0 && allows(BodyPart::Root) && !additive {
        let m = layer.root_motion();
        if out.root_w > 0.0 {
            let base = out.root_motion();
            out.root_dp = base.delta_position.lerp(m.delta_position, weight);
            out.root_dr = single(base.delta_rotation.slerp(m.delta_rotation, weight));
            out.gravity = base.gravity_weight + (m.gravity_weight - base.gravity_weight) * weight;
        } else {
            out.root_dp = m.delta_position * weight;
            out.root_dr = single(Quat::IDENTITY.slerp(m.delta_rotation, weight));
            out.gravity = m.gravity_weight;
        }
        out.root_w = 1.0;
    }
}

fn single(q: Quat) -> QuatAccum {
    let mut a = QuatAccum::default();
    a.add(q, 1.0);
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::name_hash;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-4
    }

    #[test]
    fn quaternions_average_on_one_hemisphere() {
        let mut acc = QuatAccum::default();
        let q = Quat::from_rotation_y(0.5);
        acc.add(q, 0.5);
        acc.add(-q, 0.5);
        assert!(acc.get().unwrap().abs_diff_eq(q, 1e-5));
    }

    #[test]
    fn override_layer_interpolates_masked_bones() {
        let bind = [Transform::IDENTITY; 2];
        let paths = [name_hash(""), name_hash("Tail")];
        let rig = BlendRig {
            paths: &paths,
            bind: &bind,
        };
        let mut out = LayerPose::new(2, 0, 0);
        let mut layer = LayerPose::new(2, 0, 0);
        layer.bones[0].add(&Transform::from_translation(Vec3::X), 1.0);
        layer.bones[1].add(&Transform::from_translation(Vec3::Y), 1.0);
        let mut mask = AvatarMask::default();
        mask.transforms = Some(vec!["Tail".into()]);
        mask.compile();
        blend_layer(&mut out, &layer, 0.5, LayerBlending::Override, Some(&mask), &rig);
        assert!(out.bones[0].get().is_none());
        assert!(out.bones[1].get().unwrap().translation.abs_diff_eq(Vec3::Y * 0.5, 1e-5));
    }

    #[test]
    fn additive_muscles_add_scaled_offsets() {
        let rig = BlendRig { paths: &[], bind: &[] };
        let mut out = LayerPose::new(0, 0, 0);
        out.muscles[3] = 0.2;
        out.muscle_w = 1.0;
        let mut layer = LayerPose::new(0, 0, 0);
        layer.muscles[3] = 0.4;
        layer.muscle_w = 1.0;
        blend_layer(&mut out, &layer, 0.5, LayerBlending::Additive, None, &rig);
        assert!(approx(out.muscles[3], 0.4));
    }

    #[test]
    fn step_properties_keep_heaviest_value() {
        let mut layer = LayerPose::new(0, 1, 0);
        layer.add_property(0, &Value::Bool(true), 0.3);
        layer.add_property(0, &Value::Bool(false), 0.7);
        assert_eq!(layer.properties[0].as_ref().unwrap().finalize(), Some(Value::Bool(false)));
    }
}
