//! Keyframe tracks and sampling.
//!
//! Model:
//! - A Track holds keyframes ordered by time (seconds, clip-local).
//! - Sampling clamps outside the key range and interpolates linearly inside it
//!   (slerp for rotations); `step` tracks hold the left key.
//! - An empty track has no value; callers fall back to the bind pose.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Types that can be keyed and interpolated.
pub trait Interpolate: Copy {
    fn interpolate(a: Self, b: Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    #[inline]
    fn interpolate(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }
}

impl Interpolate for Vec3 {
    #[inline]
    fn interpolate(a: Vec3, b: Vec3, t: f32) -> Vec3 {
        a.lerp(b, t)
    }
}

impl Interpolate for Quat {
    #[inline]
    fn interpolate(a: Quat, b: Quat, t: f32) -> Quat {
        a.slerp(b, t)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track<T> {
    pub keys: Vec<Keyframe<T>>,
    /// Hold the left key instead of interpolating.
    #[serde(default)]
    pub step: bool,
}

pub type FloatCurve = Track<f32>;
pub type Vec3Track = Track<Vec3>;
pub type QuatTrack = Track<Quat>;

impl<T> Default for Track<T> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            step: false,
        }
    }
}

/// Find the segment [i, i+1] that contains `t` and the local factor in [0, 1].
/// Before the first key returns (0, 0, 0); after the last returns (last, last, 0).
fn find_segment<T>(keys: &[Keyframe<T>], t: f32) -> (usize, usize, f32) {
    let n = keys.len();
    if n <= 1 || t <= keys[0].time {
        return (0, 0, 0.0);
    }
    if t >= keys[n - 1].time {
        return (n - 1, n - 1, 0.0);
    }
    // first key strictly after t; guaranteed in 1..n by the checks above
    let hi = keys.partition_point(|k| k.time <= t).clamp(1, n - 1);
    let lo = hi - 1;
    let denom = (keys[hi].time - keys[lo].time).max(f32::EPSILON);
    let lt = (t - keys[lo].time) / denom;
    (lo, hi, lt.clamp(0.0, 1.0))
}

impl<T: Interpolate> Track<T> {
    pub fn new(keys: Vec<Keyframe<T>>) -> Self {
        let mut track = Self { keys, step: false };
        track.sort();
        track
    }

    /// Two-key linear track from `(0, a)` to `(duration, b)`.
    pub fn linear(duration: f32, a: T, b: T) -> Self {
        Self::new(vec![
            Keyframe { time: 0.0, value: a },
            Keyframe {
                time: duration,
                value: b,
            },
        ])
    }

    pub fn constant(value: T) -> Self {
        Self::new(vec![Keyframe { time: 0.0, value }])
    }

    pub fn sort(&mut self) {
        self.keys.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn end_time(&self) -> f32 {
        self.keys.last().map_or(0.0, |k| k.time)
    }

    pub fn sample(&self, t: f32) -> Option<T> {
        match self.keys.len() {
            0 => None,
            1 => Some(self.keys[0].value),
            _ => {
                let (i0, i1, lt) = find_segment(&self.keys, t);
                if i0 == i1 || self.step {
                    return Some(self.keys[i0].value);
                }
                Some(T::interpolate(self.keys[i0].value, self.keys[i1].value, lt))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-5
    }

    #[test]
    fn clamps_and_interpolates() {
        let c = FloatCurve::new(vec![
            Keyframe { time: 0.0, value: 0.0 },
            Keyframe { time: 1.0, value: 2.0 },
            Keyframe { time: 2.0, value: 0.0 },
        ]);
        assert!(approx(c.sample(-1.0).unwrap(), 0.0));
        assert!(approx(c.sample(0.5).unwrap(), 1.0));
        assert!(approx(c.sample(1.5).unwrap(), 1.0));
        assert!(approx(c.sample(9.0).unwrap(), 0.0));
    }

    #[test]
    fn step_holds_left_key() {
        let mut c = FloatCurve::linear(1.0, 0.0, 1.0);
        c.step = true;
        assert_eq!(c.sample(0.99), Some(0.0));
        assert_eq!(c.sample(1.0), Some(1.0));
    }

    #[test]
    fn unsorted_keys_are_sorted() {
        let c = FloatCurve::new(vec![
            Keyframe { time: 1.0, value: 1.0 },
            Keyframe { time: 0.0, value: 0.0 },
        ]);
        assert!(approx(c.sample(0.25).unwrap(), 0.25));
    }

    #[test]
    fn empty_has_no_value() {
        assert_eq!(FloatCurve::default().sample(0.0), None);
    }

    #[test]
    fn quat_track_slerps() {
        let q = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let t = QuatTrack::linear(1.0, Quat::IDENTITY, q);
        let mid = t.sample(0.5).unwrap();
        let expect = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        assert!(mid.abs_diff_eq(expect, 1e-5));
    }
}
