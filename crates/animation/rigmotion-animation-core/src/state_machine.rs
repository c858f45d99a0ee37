//! Layered state machine interpreter.
//!
//! Each non-synced layer owns one `StateMachineMemory`. A tick applies a
//! pending request, advances state time, advances an active transition and
//! finally looks for a new transition to start. Normalized time is kept
//! unwrapped so exit-time and event crossings can be tested over the exact
//! `(previous, current]` window of the tick; sampling wraps or clamps it.

use serde::{Deserialize, Serialize};

use crate::blend_tree;
use crate::controller::{ControllerGraph, LayerSource};
use crate::ids::NameHash;
use crate::inputs::StateRequest;
use crate::motion::Motion;
use crate::outputs::AnimatorEvent;
use crate::values::{ParameterValue, ValueStore};

const EPS: f32 = 1e-6;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionMode {
    If,
    IfNot,
    Greater,
    Less,
    Equals,
    NotEqual,
    ExitTime,
}

/// One resolved condition. `parameter` is a schema index; exit-time
/// conditions carry none and use `threshold` as the exit time.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Condition {
    pub mode: ConditionMode,
    pub parameter: Option<usize>,
    pub threshold: f32,
}

impl Condition {
    /// Missing parameters are never satisfied.
    pub fn holds(&self, values: &ValueStore, time: &StateTime, looping: bool) -> bool {
        use ConditionMode::*;
        if self.mode == ExitTime {
            return exit_time_crossed(
                time.prev_normalized,
                time.normalized,
                self.threshold,
                looping,
                time.inclusive,
            );
        }
        let Some(value) = self.parameter.and_then(|i| values.at(i)) else {
            return false;
        };
        match (self.mode, value) {
            (If, ParameterValue::Bool(b)) => b,
            (IfNot, ParameterValue::Bool(b)) => !b,
            (Greater, v) => v.as_f32() > self.threshold,
            (Less, v) => v.as_f32() < self.threshold,
            (Equals, ParameterValue::Int(i)) => i == self.threshold.round() as i32,
            (NotEqual, ParameterValue::Int(i)) => i != self.threshold.round() as i32,
            (Equals, v) => v.as_f32() == self.threshold,
            (NotEqual, v) => v.as_f32() != self.threshold,
            _ => false,
        }
    }
}

/// Whether the unwrapped window `(prev, cur]` (or `[prev, cur]` when
/// `inclusive`) crosses the exit point. Reverse playback tests the mirrored
/// window `[cur, prev)` (`[cur, prev]` when `inclusive`). Looping states with
/// `exit < 1` exit on every `k + exit`; otherwise only `exit` itself counts.
pub fn exit_time_crossed(prev: f32, cur: f32, exit: f32, looping: bool, inclusive: bool) -> bool {
    let (lo, hi, lo_closed, hi_closed) = if cur >= prev {
        (prev, cur, inclusive, true)
    } else {
        (cur, prev, true, inclusive)
    };
    let hit = |x: f32| (x > lo || (lo_closed && x == lo)) && (x < hi || (hi_closed && x == hi));
    if looping && exit < 1.0 {
        let exit = exit.max(0.0);
        // k + exit <= lo < k + 1 + exit
        let k = (lo - exit).floor();
        hit(k + exit) || hit(k + 1.0 + exit)
    } else {
        hit(exit)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DurationMode {
    #[default]
    Seconds,
    /// Fraction of the source state's duration.
    Normalized,
}

#[derive(Clone, Debug)]
pub struct Transition {
    pub name_hash: NameHash,
    pub destination: usize,
    pub conditions: Vec<Condition>,
    pub duration: f32,
    pub duration_mode: DurationMode,
    /// Normalized start time of the destination.
    pub offset: f32,
    /// Atomic transitions cannot be interrupted.
    pub atomic: bool,
    pub solo: bool,
    pub mute: bool,
    /// Any-state transitions only.
    pub can_transition_to_self: bool,
}

impl Transition {
    fn conditions_hold(&self, values: &ValueStore, time: &StateTime, looping: bool) -> bool {
        self.conditions.iter().all(|c| c.holds(values, time, looping))
    }
}

#[derive(Clone, Debug)]
pub struct State {
    pub name: String,
    pub name_hash: NameHash,
    /// Hash of `"<layer>.<state>"`.
    pub path_hash: NameHash,
    pub tag_hash: NameHash,
    pub motion: Option<Motion>,
    pub speed: f32,
    pub speed_parameter: Option<usize>,
    pub mirror: bool,
    pub foot_ik: bool,
    pub cycle_offset: f32,
    pub transitions: Vec<Transition>,
}

#[derive(Clone, Debug)]
pub struct StateMachine {
    pub states: Vec<State>,
    pub any_state: Vec<Transition>,
    pub default_state: usize,
}

impl StateMachine {
    pub fn find(&self, name_hash: NameHash) -> Option<usize> {
        self.states
            .iter()
            .position(|s| s.name_hash == name_hash || s.path_hash == name_hash)
    }
}

/// Time of one playing state.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StateTime {
    pub state: usize,
    /// Unwrapped normalized time.
    pub normalized: f32,
    pub prev_normalized: f32,
    /// Effective duration in seconds at the last advance.
    pub duration: f32,
    fresh: bool,
    inclusive: bool,
}

impl StateTime {
    pub fn enter(state: usize, normalized: f32) -> Self {
        Self {
            state,
            normalized,
            prev_normalized: normalized,
            duration: 0.0,
            fresh: true,
            inclusive: true,
        }
    }

    pub fn seconds(&self) -> f32 {
        self.normalized * self.duration
    }

    /// The window of this tick includes its start (first advance after entry).
    #[inline]
    pub fn window_includes_start(&self) -> bool {
        self.inclusive
    }

    fn advance(&mut self, dn: f32) {
        self.inclusive = self.fresh;
        self.fresh = false;
        self.prev_normalized = self.normalized;
        self.normalized += dn;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransitionSource {
    State,
    AnyState,
    Request,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ActiveTransition {
    pub name_hash: NameHash,
    pub next: StateTime,
    /// In `[0, 1]`.
    pub progress: f32,
    pub duration: f32,
    pub atomic: bool,
    pub source: TransitionSource,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StateMachineMemory {
    pub current: StateTime,
    pub transition: Option<ActiveTransition>,
    pending: Option<StateRequest>,
    started: bool,
}

impl StateMachineMemory {
    pub fn new(sm: &StateMachine) -> Self {
        Self {
            current: StateTime::enter(sm.default_state, 0.0),
            transition: None,
            pending: None,
            started: false,
        }
    }

    #[inline]
    pub fn is_in_transition(&self) -> bool {
        self.transition.is_some()
    }

    /// Queue a request for the next tick, replacing any queued one.
    pub fn request(&mut self, req: StateRequest) {
        self.pending = Some(req);
    }

    pub fn pending(&self) -> Option<&StateRequest> {
        self.pending.as_ref()
    }

    /// Playing states with their blend weights: current, then next.
    pub fn weighted_states(&self) -> impl Iterator<Item = (&StateTime, f32)> {
        let p = self.transition.as_ref().map_or(0.0, |t| t.progress);
        std::iter::once((&self.current, 1.0 - p))
            .chain(self.transition.as_ref().map(|t| (&t.next, t.progress)))
            .filter(|(_, w)| *w > 0.0)
    }
}

/// Per-layer inputs a step needs besides the machine and its memory.
pub struct StepCtx<'a> {
    pub graph: &'a ControllerGraph,
    pub layer: usize,
    pub layer_weights: &'a [f32],
    /// Instance speed.
    pub speed: f32,
}

impl StepCtx<'_> {
    /// Effective duration of `state`, blending in the durations of synced
    /// layers that affect timing by their layer weight.
    pub fn state_duration(&self, state: usize, values: &ValueStore, buf: &mut Vec<f32>) -> f32 {
        let graph = self.graph;
        let mut duration = graph
            .state_motion(self.layer, state)
            .map_or(0.0, |m| blend_tree::weighted_duration(graph, m, values, buf));
        for (i, layer) in graph.layers().iter().enumerate() {
            if let LayerSource::Synced {
                layer: reference,
                affects_timing: true,
                motions,
            } = &layer.source
            {
                if *reference != self.layer {
                    continue;
                }
                if let Some(Some(m)) = motions.get(state) {
                    let synced = blend_tree::weighted_duration(graph, *m, values, buf);
                    let w = self.layer_weights.get(i).copied().unwrap_or(0.0).clamp(0.0, 1.0);
                    duration += (synced - duration) * w;
                }
            }
        }
        duration
    }

    fn looping(&self, state: usize) -> bool {
        self.graph
            .state_motion(self.layer, state)
            .is_some_and(|m| m.is_looping(self.graph))
    }

    fn state_speed(&self, sm: &StateMachine, state: usize, values: &ValueStore) -> f32 {
        let s = &sm.states[state];
        let mult = s.speed_parameter.map_or(1.0, |i| values.float_at(i));
        s.speed * mult * self.speed
    }
}

/// Advance one layer by `dt` seconds.
#[allow(clippy::too_many_arguments)]
pub fn step(
    ctx: &StepCtx,
    sm: &StateMachine,
    mem: &mut StateMachineMemory,
    values: &mut ValueStore,
    dt: f32,
    events: &mut Vec<AnimatorEvent>,
    buf: &mut Vec<f32>,
) {
    if !mem.started {
        mem.started = true;
        events.push(AnimatorEvent::StateEntered {
            layer: ctx.layer,
            state: sm.states[mem.current.state].name_hash,
        });
    }

    if let Some(req) = mem.pending.take() {
        if !apply_request(ctx, sm, mem, values, req, events, buf) {
            mem.pending = Some(req);
        }
    }

    advance_time(ctx, sm, &mut mem.current, values, dt, buf);
    if let Some(t) = mem.transition.as_mut() {
        advance_time(ctx, sm, &mut t.next, values, dt, buf);
    }

    if let Some(t) = mem.transition.as_mut() {
        t.progress = (t.progress + dt * ctx.speed.abs() / t.duration).clamp(0.0, 1.0);
        if t.progress >= 1.0 {
            commit(ctx, sm, mem, events);
        }
    }

    let any_only = match &mem.transition {
        None => false,
        Some(t) if !t.atomic => true,
        Some(_) => return,
    };
    if let Some((t, source)) = find_candidate(ctx, sm, mem, values, any_only) {
        start_transition(ctx, sm, mem, values, t, source, events, buf);
    }
}

fn advance_time(
    ctx: &StepCtx,
    sm: &StateMachine,
    time: &mut StateTime,
    values: &ValueStore,
    dt: f32,
    buf: &mut Vec<f32>,
) {
    let duration = ctx.state_duration(time.state, values, buf);
    time.duration = duration;
    let speed = ctx.state_speed(sm, time.state, values);
    // zero-length motions advance as if one second long
    let length = if duration > EPS { duration } else { 1.0 };
    time.advance(dt * speed / length);
}

fn commit(ctx: &StepCtx, sm: &StateMachine, mem: &mut StateMachineMemory, events: &mut Vec<AnimatorEvent>) {
    if let Some(t) = mem.transition.take() {
        events.push(AnimatorEvent::StateExited {
            layer: ctx.layer,
            state: sm.states[mem.current.state].name_hash,
        });
        mem.current = t.next;
    }
}

fn find_candidate<'s>(
    ctx: &StepCtx,
    sm: &'s StateMachine,
    mem: &StateMachineMemory,
    values: &ValueStore,
    any_only: bool,
) -> Option<(&'s Transition, TransitionSource)> {
    let current = mem.current.state;
    let next = mem.transition.as_ref().map(|t| t.next.state);
    let looping = ctx.looping(current);
    let time = &mem.current;

    let any_ok = |t: &Transition| {
        !t.mute
            && (t.can_transition_to_self || (t.destination != current && Some(t.destination) != next))
            && t.conditions_hold(values, time, looping)
    };

    if let Some(t) = sm.any_state.iter().find(|t| t.solo && any_ok(t)) {
        return Some((t, TransitionSource::AnyState));
    }
    if !any_only {
        let local = &sm.states[current].transitions;
        let has_solo = local.iter().any(|t| t.solo && !t.mute);
        if let Some(t) = local
            .iter()
            .filter(|t| !t.mute && (!has_solo || t.solo))
            .find(|t| t.conditions_hold(values, time, looping))
        {
            return Some((t, TransitionSource::State));
        }
    }
    sm.any_state
        .iter()
        .find(|t| !t.solo && any_ok(t))
        .map(|t| (t, TransitionSource::AnyState))
}

#[allow(clippy::too_many_arguments)]
fn start_transition(
    ctx: &StepCtx,
    sm: &StateMachine,
    mem: &mut StateMachineMemory,
    values: &mut ValueStore,
    t: &Transition,
    source: TransitionSource,
    events: &mut Vec<AnimatorEvent>,
    buf: &mut Vec<f32>,
) {
    // an interrupted transition lands on its destination first
    commit(ctx, sm, mem, events);
    for c in &t.conditions {
        if let (ConditionMode::If, Some(p)) = (c.mode, c.parameter) {
            values.consume_trigger(p);
        }
    }
    let duration = match t.duration_mode {
        DurationMode::Seconds => t.duration,
        DurationMode::Normalized => t.duration * mem.current.duration,
    };
    begin(
        ctx,
        sm,
        mem,
        values,
        t.destination,
        t.offset,
        duration,
        t.atomic,
        source,
        t.name_hash,
        events,
        buf,
    );
}

#[allow(clippy::too_many_arguments)]
fn begin(
    ctx: &StepCtx,
    sm: &StateMachine,
    mem: &mut StateMachineMemory,
    values: &ValueStore,
    destination: usize,
    offset: f32,
    duration: f32,
    atomic: bool,
    source: TransitionSource,
    name_hash: NameHash,
    events: &mut Vec<AnimatorEvent>,
    buf: &mut Vec<f32>,
) {
    let from = sm.states[mem.current.state].name_hash;
    let to = sm.states[destination].name_hash;
    events.push(AnimatorEvent::TransitionStarted {
        layer: ctx.layer,
        from,
        to,
    });
    events.push(AnimatorEvent::StateEntered {
        layer: ctx.layer,
        state: to,
    });
    let mut next = StateTime::enter(destination, offset);
    next.duration = ctx.state_duration(destination, values, buf);
    mem.transition = Some(ActiveTransition {
        name_hash,
        next,
        progress: 0.0,
        duration,
        atomic,
        source,
    });
    if duration.is_nan() || duration <= EPS {
        commit(ctx, sm, mem, events);
    }
}

/// Returns false when the request must wait (cross-fade during an atomic
/// transition).
fn apply_request(
    ctx: &StepCtx,
    sm: &StateMachine,
    mem: &mut StateMachineMemory,
    values: &ValueStore,
    req: StateRequest,
    events: &mut Vec<AnimatorEvent>,
    buf: &mut Vec<f32>,
) -> bool {
    match req {
        StateRequest::Play {
            state,
            normalized_time,
        } => {
            if let Some(t) = mem.transition.take() {
                events.push(AnimatorEvent::StateExited {
                    layer: ctx.layer,
                    state: sm.states[t.next.state].name_hash,
                });
            }
            events.push(AnimatorEvent::StateExited {
                layer: ctx.layer,
                state: sm.states[mem.current.state].name_hash,
            });
            events.push(AnimatorEvent::StateEntered {
                layer: ctx.layer,
                state: sm.states[state].name_hash,
            });
            mem.current = StateTime::enter(state, normalized_time);
            mem.current.duration = ctx.state_duration(state, values, buf);
            true
        }
        StateRequest::CrossFade {
            state,
            duration,
            normalized_time,
        } => {
            if mem.transition.as_ref().is_some_and(|t| t.atomic) {
                return false;
            }
            commit(ctx, sm, mem, events);
            let name_hash = sm.states[state].name_hash;
            begin(
                ctx,
                sm,
                mem,
                values,
                state,
                normalized_time,
                duration,
                false,
                TransitionSource::Request,
                name_hash,
                events,
                buf,
            );
            true
        }
    }
}
