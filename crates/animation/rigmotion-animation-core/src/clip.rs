//! Animation clips: muscle, root, goal, bone, parameter and property curves
//! plus time-stamped events.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::curve::{FloatCurve, QuatTrack, Vec3Track};
use crate::human::{AvatarGoal, HumanBone, MuscleAxis};
use rigmotion_api_core::PropertyPath;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MuscleCurve {
    pub bone: HumanBone,
    pub axis: MuscleAxis,
    pub curve: FloatCurve,
}

/// Animated IK goal placement, in the instance root frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalCurves {
    pub goal: AvatarGoal,
    #[serde(default)]
    pub position: Vec3Track,
    #[serde(default)]
    pub rotation: QuatTrack,
}

/// Generic bone TRS curves keyed by transform path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneCurves {
    pub path: String,
    #[serde(default)]
    pub translation: Option<Vec3Track>,
    #[serde(default)]
    pub rotation: Option<QuatTrack>,
    #[serde(default)]
    pub scale: Option<Vec3Track>,
}

/// Float curve that drives the controller parameter of the same name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterCurve {
    pub name: String,
    pub curve: FloatCurve,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyCurveKind {
    Float,
    /// Non-zero keys read as true; always stepped.
    Bool,
    /// Keys hold object ids; negative means "none". Always stepped.
    ObjectRef,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyCurve {
    pub path: PropertyPath,
    pub kind: PropertyCurveKind,
    pub curve: FloatCurve,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationEvent {
    /// Clip-local time in seconds.
    pub time: f32,
    pub name: String,
    #[serde(default)]
    pub payload: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    #[serde(default)]
    pub looping: bool,
    /// How much gravity the host should apply while this clip plays.
    #[serde(default = "one")]
    pub gravity_weight: f32,
    #[serde(default)]
    pub muscles: Vec<MuscleCurve>,
    /// Hips placement relative to the root.
    #[serde(default)]
    pub body_position: Option<Vec3Track>,
    #[serde(default)]
    pub body_rotation: Option<QuatTrack>,
    /// Root transform curves; their deltas become root motion on humanoid rigs.
    #[serde(default)]
    pub root_position: Option<Vec3Track>,
    #[serde(default)]
    pub root_rotation: Option<QuatTrack>,
    #[serde(default)]
    pub goals: Vec<GoalCurves>,
    #[serde(default)]
    pub bones: Vec<BoneCurves>,
    #[serde(default)]
    pub parameters: Vec<ParameterCurve>,
    #[serde(default)]
    pub properties: Vec<PropertyCurve>,
    #[serde(default)]
    pub events: Vec<AnimationEvent>,
}

fn one() -> f32 {
    1.0
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, duration: f32, looping: bool) -> Self {
        Self {
            name: name.into(),
            duration,
            looping,
            gravity_weight: 1.0,
            muscles: Vec::new(),
            body_position: None,
            body_rotation: None,
            root_position: None,
            root_rotation: None,
            goals: Vec::new(),
            bones: Vec::new(),
            parameters: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Sort keys and events; called once when a graph is built.
    pub fn prepare(&mut self) {
        self.events.sort_by(|a, b| a.time.total_cmp(&b.time));
        for m in &mut self.muscles {
            m.curve.sort();
        }
        for t in [&mut self.body_position, &mut self.root_position].into_iter().flatten() {
            t.sort();
        }
        for t in [&mut self.body_rotation, &mut self.root_rotation].into_iter().flatten() {
            t.sort();
        }
        for g in &mut self.goals {
            g.position.sort();
            g.rotation.sort();
        }
        for b in &mut self.bones {
            b.translation.iter_mut().for_each(|t| t.sort());
            b.rotation.iter_mut().for_each(|t| t.sort());
            b.scale.iter_mut().for_each(|t| t.sort());
        }
        for c in self.parameters.iter_mut().map(|p| &mut p.curve) {
            c.sort();
        }
        for c in self.properties.iter_mut().map(|p| &mut p.curve) {
            c.sort();
        }
        if self.duration.is_nan() || self.duration < 0.0 {
            self.duration = 0.0;
        }
    }

    /// Humanoid clips carry muscle or body curves.
    pub fn is_humanoid(&self) -> bool {
        !self.muscles.is_empty() || self.body_position.is_some() || self.body_rotation.is_some()
    }

    /// Clip-local sampling time for an unwrapped normalized time.
    pub fn local_time(&self, normalized: f32) -> f32 {
        if self.looping {
            normalized.rem_euclid(1.0) * self.duration
        } else {
            normalized.clamp(0.0, 1.0) * self.duration
        }
    }

    /// Root placement (position, rotation) at clip-local time `t`.
    pub fn root_at(&self, t: f32) -> (Vec3, Quat) {
        let p = self
            .root_position
            .as_ref()
            .and_then(|c| c.sample(t))
            .unwrap_or(Vec3::ZERO);
        let q = self
            .root_rotation
            .as_ref()
            .and_then(|c| c.sample(t))
            .unwrap_or(Quat::IDENTITY);
        (p, q)
    }

    pub fn has_root_curves(&self) -> bool {
        self.root_position.is_some() || self.root_rotation.is_some()
    }

    /// Events crossed by the unwrapped normalized window `(prev, cur]`, or
    /// `[prev, cur]` when `inclusive_start` (first tick after entering a state).
    /// Looping clips report every pass; one-shot clips report each event once.
    pub fn for_each_event_crossed(
        &self,
        prev: f32,
        cur: f32,
        inclusive_start: bool,
        mut f: impl FnMut(&AnimationEvent),
    ) {
        if self.events.is_empty() || cur < prev || self.duration <= 0.0 {
            return;
        }
        let hit = |x: f32| (x > prev || (inclusive_start && x == prev)) && x <= cur;
        if !self.looping {
            for ev in &self.events {
                if hit(ev.time / self.duration) {
                    f(ev);
                }
            }
            return;
        }
        let first = prev.floor() as i64;
        let last = cur.floor() as i64;
        for k in first..=last {
            for ev in &self.events {
                let x = k as f32 + ev.time / self.duration;
                if hit(x) {
                    f(ev);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip_with_event(looping: bool) -> AnimationClip {
        let mut c = AnimationClip::new("step", 2.0, looping);
        c.events.push(AnimationEvent {
            time: 1.0,
            name: "Footstep".into(),
            payload: "left".into(),
        });
        c
    }

    fn count(c: &AnimationClip, prev: f32, cur: f32, inclusive: bool) -> usize {
        let mut n = 0;
        c.for_each_event_crossed(prev, cur, inclusive, |_| n += 1);
        n
    }

    #[test]
    fn event_fires_once_per_crossing() {
        let c = clip_with_event(true);
        assert_eq!(count(&c, 0.0, 0.4, false), 0);
        assert_eq!(count(&c, 0.4, 0.5, false), 1);
        assert_eq!(count(&c, 0.5, 0.6, false), 0);
        // two loop passes in one large step
        assert_eq!(count(&c, 0.4, 2.6, false), 3);
    }

    #[test]
    fn one_shot_fires_only_first_pass() {
        let c = clip_with_event(false);
        assert_eq!(count(&c, 0.0, 3.0, false), 1);
        assert_eq!(count(&c, 1.0, 3.0, false), 0);
    }

    #[test]
    fn inclusive_start_catches_event_at_entry() {
        let mut c = clip_with_event(true);
        c.events[0].time = 0.0;
        assert_eq!(count(&c, 0.0, 0.1, true), 1);
        assert_eq!(count(&c, 0.0, 0.1, false), 0);
    }

    #[test]
    fn local_time_wraps_or_clamps() {
        let looping = AnimationClip::new("a", 2.0, true);
        let once = AnimationClip::new("b", 2.0, false);
        assert!((looping.local_time(1.25) - 0.5).abs() < 1e-5);
        assert!((once.local_time(1.25) - 2.0).abs() < 1e-5);
    }
}
