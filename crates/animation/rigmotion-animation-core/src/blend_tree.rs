//! Blend tree evaluation: per-child weights for 1D and 2D blend spaces, and
//! recursive flattening into weighted leaf clips.
//!
//! Weight rules shared by every blend type:
//! - 0 children yields no weights, 1 child yields weight 1.
//! - Parameters equal to a child's threshold/position give that child weight 1
//!   (the first one when duplicated) and every other child 0.
//! - Weights are nonnegative and normalized; a zero total falls back to full
//!   weight on the nearest child, so no NaN can escape.

use std::f32::consts::PI;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::controller::ControllerGraph;
use crate::ids::ClipId;
use crate::motion::Motion;
use crate::values::ValueStore;

const EPS: f32 = 1e-5;
/// Angle scale of polar-space gaps in freeform directional blending.
const POLAR_ANGLE_WEIGHT: f32 = 2.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendType {
    Simple1D,
    SimpleDirectional2D,
    FreeformDirectional2D,
    FreeformCartesian2D,
}

impl BlendType {
    pub fn is_2d(self) -> bool {
        !matches!(self, BlendType::Simple1D)
    }
}

#[derive(Clone, Debug)]
pub struct BlendChild {
    pub motion: Motion,
    pub threshold: f32,
    pub position: Vec2,
    pub time_scale: f32,
    pub cycle_offset: f32,
    pub mirror: bool,
}

#[derive(Clone, Debug)]
pub struct BlendTree {
    pub name: String,
    pub blend_type: BlendType,
    pub param_x: usize,
    pub param_y: Option<usize>,
    /// 1D children are kept sorted ascending by threshold.
    children: Vec<BlendChild>,
    /// Every parameter referenced by this tree and its nested trees.
    pub referenced_parameters: Vec<usize>,
    thresholds: Vec<f32>,
    positions: Vec<Vec2>,
    directions: Directions,
}

impl BlendTree {
    /// `children` must already be in evaluation order.
    pub fn new(
        name: String,
        blend_type: BlendType,
        param_x: usize,
        param_y: Option<usize>,
        children: Vec<BlendChild>,
        referenced_parameters: Vec<usize>,
    ) -> Self {
        let thresholds: Vec<f32> = children.iter().map(|c| c.threshold).collect();
        let positions: Vec<Vec2> = children.iter().map(|c| c.position).collect();
        let directions = Directions::new(&positions);
        Self {
            name,
            blend_type,
            param_x,
            param_y,
            children,
            referenced_parameters,
            thresholds,
            positions,
            directions,
        }
    }

    pub fn children(&self) -> &[BlendChild] {
        &self.children
    }

    /// Child weights for the current parameters, appended to `out`.
    pub fn compute_weights(&self, values: &ValueStore, out: &mut Vec<f32>) {
        let x = values.float_at(self.param_x);
        let start = out.len();
        out.resize(start + self.children.len(), 0.0);
        let slot = &mut out[start..];
        let p = Vec2::new(x, self.param_y.map_or(0.0, |i| values.float_at(i)));
        match self.blend_type {
            BlendType::Simple1D => weights_1d(&self.thresholds, x, slot),
            BlendType::SimpleDirectional2D => weights_simple_directional(&self.positions, &self.directions, p, slot),
            BlendType::FreeformDirectional2D => weights_freeform(&self.positions, p, true, slot),
            BlendType::FreeformCartesian2D => weights_freeform(&self.positions, p, false, slot),
        }
    }
}

/// Angular layout of 2D children around the origin.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Directions {
    /// Child sitting at the origin, if any.
    centre: Option<usize>,
    /// `(angle, child)` of every other child, ascending by angle.
    ring: Vec<(f32, usize)>,
}

impl Directions {
    pub fn new(positions: &[Vec2]) -> Self {
        let centre = positions.iter().position(|q| q.length_squared() <= EPS * EPS);
        let mut ring: Vec<(f32, usize)> = positions
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != centre)
            .map(|(i, q)| (angle_of(*q), i))
            .collect();
        ring.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { centre, ring }
    }
}

/// Piecewise-linear weights over ascending thresholds; edge children take
/// full weight outside the range.
pub fn weights_1d(thresholds: &[f32], x: f32, out: &mut [f32]) {
    let n = thresholds.len();
    out.iter_mut().for_each(|w| *w = 0.0);
    if n == 0 {
        return;
    }
    if n == 1 || !x.is_finite() {
        out[0] = 1.0;
        return;
    }
    if let Some(i) = thresholds.iter().position(|t| *t == x) {
        out[i] = 1.0;
        return;
    }
    if x <= thresholds[0] {
        out[0] = 1.0;
        return;
    }
    if x >= thresholds[n - 1] {
        out[n - 1] = 1.0;
        return;
    }
    for i in 0..n - 1 {
        let (a, b) = (thresholds[i], thresholds[i + 1]);
        if x >= a && x < b {
            let span = b - a;
            if span <= EPS {
                out[i] = 1.0;
            } else {
                let t = (x - a) / span;
                out[i] = 1.0 - t;
                out[i + 1] = t;
            }
            return;
        }
    }
    out[n - 1] = 1.0;
}

fn exact_match(positions: &[Vec2], p: Vec2) -> Option<usize> {
    positions.iter().position(|q| q.distance_squared(p) <= EPS * EPS)
}

fn nearest(positions: &[Vec2], p: Vec2) -> usize {
    let mut best = 0;
    let mut best_d = f32::INFINITY;
    for (i, q) in positions.iter().enumerate() {
        let d = q.distance_squared(p);
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

/// Normalize in place; a zero or non-finite total becomes full weight on the
/// nearest child.
fn normalize_or_nearest(positions: &[Vec2], p: Vec2, out: &mut [f32]) {
    let total: f32 = out.iter().sum();
    if total > EPS && total.is_finite() {
        out.iter_mut().for_each(|w| *w /= total);
    } else {
        out.iter_mut().for_each(|w| *w = 0.0);
        if !out.is_empty() {
            out[nearest(positions, p)] = 1.0;
        }
    }
}

fn angle_of(v: Vec2) -> f32 {
    v.y.atan2(v.x).rem_euclid(2.0 * PI)
}

/// Angular bucketing between the two directional children that bracket the
/// input direction, plus an optional centre child at the origin. Inside the
/// (centre, a, b) triangle the weights are barycentric; outside it the two
/// directional children share the weight.
pub fn weights_simple_directional(positions: &[Vec2], directions: &Directions, p: Vec2, out: &mut [f32]) {
    out.iter_mut().for_each(|w| *w = 0.0);
    match positions.len() {
        0 => return,
        1 => {
            out[0] = 1.0;
            return;
        }
        _ => {}
    }
    if let Some(i) = exact_match(positions, p) {
        out[i] = 1.0;
        return;
    }
    let Directions { centre, ring } = directions;
    let centre = *centre;

    if p.length_squared() <= EPS * EPS || ring.is_empty() {
        let i = centre.unwrap_or_else(|| nearest(positions, p));
        out[i] = 1.0;
        return;
    }

    let theta = angle_of(p);
    let next = ring.iter().position(|(a, _)| *a > theta).unwrap_or(0);
    let prev = if next == 0 { ring.len() - 1 } else { next - 1 };
    let (ia, ib) = (ring[prev].1, ring[next].1);
    let (a, b) = (positions[ia], positions[ib]);

    let (mut wa, mut wb);
    let det = a.perp_dot(b);
    if ia != ib && det.abs() > EPS {
        // p = wa * a + wb * b
        wa = p.perp_dot(b) / det;
        wb = a.perp_dot(p) / det;
    } else {
        // single direction or collinear pair: project onto the closest direction
        let closest = if ia == ib || a.angle_to(p).abs() <= b.angle_to(p).abs() {
            ia
        } else {
            ib
        };
        let d = positions[closest];
        let t = (p.dot(d) / d.length_squared()).max(0.0);
        wa = if closest == ia { t } else { 0.0 };
        wb = if closest == ib && ia != ib { t } else { 0.0 };
    }
    wa = wa.max(0.0);
    wb = wb.max(0.0);

    match centre {
        Some(c) if wa + wb <= 1.0 => {
            out[ia] += wa;
            out[ib] += wb;
            out[c] = 1.0 - wa - wb;
        }
        _ => {
            out[ia] += wa;
            out[ib] += wb;
        }
    }
    normalize_or_nearest(positions, p, out);
}

/// Signed angle from `a` to `b`; 0 when either vector is zero.
fn signed_angle(a: Vec2, b: Vec2) -> f32 {
    if a.length_squared() <= EPS * EPS || b.length_squared() <= EPS * EPS {
        return 0.0;
    }
    a.angle_to(b)
}

/// Gradient band interpolation. For each child i:
/// `h_i = min_j (1 - (p - p_i)·(p_j - p_i) / |p_j - p_i|²)` clamped at 0,
/// then normalized. The directional variant measures gaps in polar space
/// (relative magnitude difference, scaled signed angle) so that children at
/// the same speed but different headings interpolate by angle.
pub fn weights_freeform(positions: &[Vec2], p: Vec2, polar: bool, out: &mut [f32]) {
    out.iter_mut().for_each(|w| *w = 0.0);
    match positions.len() {
        0 => return,
        1 => {
            out[0] = 1.0;
            return;
        }
        _ => {}
    }
    if let Some(i) = exact_match(positions, p) {
        out[i] = 1.0;
        return;
    }
    let p_len = p.length();
    for (i, pi) in positions.iter().enumerate() {
        let pi_len = pi.length();
        let mut h = f32::INFINITY;
        for (j, pj) in positions.iter().enumerate() {
            if i == j {
                continue;
            }
            let (gap, to_p) = if polar {
                let pj_len = pj.length();
                let mean = (pj_len + pi_len) * 0.5;
                if mean <= EPS {
                    continue;
                }
                (
                    Vec2::new(
                        (pj_len - pi_len) / mean,
                        signed_angle(*pi, *pj) * POLAR_ANGLE_WEIGHT,
                    ),
                    Vec2::new(
                        (p_len - pi_len) / mean,
                        signed_angle(*pi, p) * POLAR_ANGLE_WEIGHT,
                    ),
                )
            } else {
                (*pj - *pi, p - *pi)
            };
            let len2 = gap.length_squared();
            if len2 <= EPS * EPS {
                // coincident children do not bound each other
                continue;
            }
            h = h.min(1.0 - to_p.dot(gap) / len2);
        }
        out[i] = if h.is_finite() { h.max(0.0) } else { 0.0 };
    }
    normalize_or_nearest(positions, p, out);
}

/// One weighted clip produced by flattening a motion.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Leaf {
    pub clip: ClipId,
    pub weight: f32,
    pub cycle_offset: f32,
    pub mirror: bool,
}

/// Flatten a motion into weighted leaf clips. `weights` is a stack-like
/// scratch buffer; it is restored to its original length on return.
pub fn flatten(
    graph: &ControllerGraph,
    motion: Motion,
    values: &ValueStore,
    weight: f32,
    cycle_offset: f32,
    mirror: bool,
    weights: &mut Vec<f32>,
    out: &mut Vec<Leaf>,
) {
    match motion {
        Motion::Clip(clip) => out.push(Leaf {
            clip,
            weight,
            cycle_offset,
            mirror,
        }),
        Motion::BlendTree(id) => {
            let Some(tree) = graph.blend_tree(id) else {
                return;
            };
            let start = weights.len();
            tree.compute_weights(values, weights);
            for (i, child) in tree.children.iter().enumerate() {
                let w = weights[start + i];
                if w <= 0.0 {
                    continue;
                }
                flatten(
                    graph,
                    child.motion,
                    values,
                    weight * w,
                    cycle_offset + child.cycle_offset,
                    mirror ^ child.mirror,
                    weights,
                    out,
                );
            }
            weights.truncate(start);
        }
    }
}

/// Aggregate duration `Σ wᵢ·durᵢ / time_scaleᵢ` over the weighted children.
pub fn weighted_duration(
    graph: &ControllerGraph,
    motion: Motion,
    values: &ValueStore,
    weights: &mut Vec<f32>,
) -> f32 {
    match motion {
        Motion::Clip(id) => graph.clip(id).map_or(0.0, |c| c.duration),
        Motion::BlendTree(id) => {
            let Some(tree) = graph.blend_tree(id) else {
                return 0.0;
            };
            let start = weights.len();
            tree.compute_weights(values, weights);
            let mut total = 0.0;
            for (i, child) in tree.children.iter().enumerate() {
                let w = weights[start + i];
                if w <= 0.0 {
                    continue;
                }
                let d = weighted_duration(graph, child.motion, values, weights);
                let scale = if child.time_scale.abs() > EPS {
                    child.time_scale.abs()
                } else {
                    1.0
                };
                total += w * d / scale;
            }
            weights.truncate(start);
            total
        }
    }
}
