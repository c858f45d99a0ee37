//! Animator: one animated instance and its per-tick pipeline.
//!
//! Stages, in order:
//! 1. `evaluate`: step state machines, sample and blend every layer, write
//!    curve-driven parameters, queue events, property writes and root motion.
//! 2. `drain_callbacks`: deliver events, then root motion.
//! 3. `retarget_and_solve`: human pose to skeleton locals, IK goals.
//! 4. `run_ik_callbacks`: per-layer IK hooks may move goals.
//! 5. `write_pose`: re-solve if goals changed, write into the rig.
//! 6. `capture`: recorder snapshot.
//!
//! Stages 1, 3 and 5 touch only this instance and can run in parallel across
//! instances; 2, 4 and 6 call into the host and run serially.

use std::sync::Arc;

use glam::{Quat, Vec3};
use rigmotion_api_core::coercion::{to_bool, to_float, to_object_ref};
use rigmotion_api_core::{PropertyWrite, Value, ValueKind, WriteBatch};

use crate::accumulate::{blend_layer, AccumEntry, BlendRig};
use crate::avatar::{AvatarConstant, HumanConstant};
use crate::binding::{AvatarBinding, RigResolver, TargetResolver};
use crate::blend_tree;
use crate::config::{AnimatorConfig, CullingMode};
use crate::controller::{ControllerGraph, LayerBlending, LayerSource};
use crate::error::{usage, AnimatorError, BuildError};
use crate::human::{AvatarGoal, HumanBone, HumanPose, GOAL_COUNT};
use crate::ids::{name_hash, ClipId, NameHash};
use crate::ik::IkTarget;
use crate::inputs::StateRequest;
use crate::outputs::{AnimatorCallbacks, AnimatorEvent, IkGoals, NoCallbacks, RootMotion, RootTransform};
use crate::recorder::{Recorder, RecorderMode};
use crate::retarget;
use crate::sampling::{sample_leaf, ActiveLeaf, SampleCtx};
use crate::scene::{RigMode, SceneRig, Transform};
use crate::scratch::Scratch;
use crate::state_machine::{self, StateMachineMemory, StateTime, StepCtx, TransitionSource};
use crate::target_match::{AvatarTarget, MatchTargetWeightMask, TargetMatch};
use crate::values::{ParameterId, ParameterValue, ValueStore};

/// Snapshot of a playing state.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StateInfo {
    pub index: usize,
    pub name_hash: NameHash,
    pub full_path_hash: NameHash,
    pub tag_hash: NameHash,
    /// Unwrapped; the integer part counts completed loops.
    pub normalized_time: f32,
    /// Effective duration in seconds.
    pub length: f32,
    pub speed: f32,
    pub looping: bool,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransitionInfo {
    pub name_hash: NameHash,
    pub destination: NameHash,
    pub normalized_time: f32,
    pub duration: f32,
    pub any_state: bool,
    pub user: bool,
}

/// Host-controlled IK goal. Positions and rotations are in world space and
/// persist until changed; `None` follows the animation.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GoalState {
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub position_weight: f32,
    pub rotation_weight: f32,
}

/// Everything that changes per tick. Cloned whole by the recorder.
#[derive(Clone, Debug)]
pub struct InstanceMemory {
    pub values: ValueStore,
    /// One entry per layer; synced layers have none.
    pub machines: Vec<Option<StateMachineMemory>>,
    pub layer_weights: Vec<f32>,
    pub pose: HumanPose,
    /// Sampled locals before retargeting.
    pub anim_locals: Vec<Transform>,
    pub locals: Vec<Transform>,
    pub globals: Vec<Transform>,
    pub goals: [GoalState; GOAL_COUNT],
    pub foot_ik: bool,
    pub root: RootTransform,
    pub root_motion: RootMotion,
    pub target_match: Option<TargetMatch>,
    pub events: Vec<AnimatorEvent>,
    pub writes: WriteBatch,
    dirty: bool,
}

impl InstanceMemory {
    fn new(graph: &ControllerGraph, binding: &AvatarBinding, cfg: &AnimatorConfig) -> Self {
        let machines = graph
            .layers()
            .iter()
            .map(|l| match &l.source {
                LayerSource::Machine(sm) => Some(StateMachineMemory::new(sm)),
                LayerSource::Synced { .. } => None,
            })
            .collect();
        let layer_weights = graph
            .layers()
            .iter()
            .enumerate()
            .map(|(i, l)| if i == 0 { 1.0 } else { l.weight.clamp(0.0, 1.0) })
            .collect();
        let mut writes = WriteBatch::new();
        writes.0.reserve(cfg.scratch.writes);
        Self {
            values: ValueStore::new(Arc::clone(graph.parameters())),
            machines,
            layer_weights,
            pose: HumanPose::default(),
            anim_locals: binding.bind_locals.clone(),
            locals: binding.bind_locals.clone(),
            globals: binding.bind_globals.clone(),
            goals: [GoalState::default(); GOAL_COUNT],
            foot_ik: false,
            root: RootTransform::default(),
            root_motion: RootMotion::default(),
            target_match: None,
            events: Vec::with_capacity(cfg.scratch.events),
            writes,
            dirty: true,
        }
    }

    fn to_root_frame(&self, world: Vec3) -> Vec3 {
        self.root.rotation.inverse() * (world - self.root.position)
    }
}

struct Bound {
    graph: Arc<ControllerGraph>,
    avatar: Arc<AvatarConstant>,
    binding: AvatarBinding,
    mem: InstanceMemory,
    scratch: Scratch,
    last_dt: f32,
}

impl Bound {
    fn goal_view(&mut self) -> GoalView<'_> {
        GoalView {
            binding: &self.binding,
            mem: &mut self.mem,
        }
    }
}

/// One animated instance: owns its rig, configuration and memory.
pub struct Animator {
    rig: SceneRig,
    config: AnimatorConfig,
    bound: Option<Bound>,
    recorder: Recorder<InstanceMemory>,
    visible: bool,
    in_flight: bool,
}

impl Animator {
    pub fn new(rig: SceneRig, config: AnimatorConfig) -> Self {
        let recorder = Recorder::new(config.recorder_capacity);
        Self {
            rig,
            config,
            bound: None,
            recorder,
            visible: true,
            in_flight: false,
        }
    }

    /// Bind with the default resolver, which accepts every property whose
    /// node exists in the rig.
    pub fn bind(&mut self, graph: Arc<ControllerGraph>, avatar: Arc<AvatarConstant>) -> Result<(), BuildError> {
        let rig = self.rig.clone();
        let mut resolver = RigResolver::new(&rig);
        self.bind_with(graph, avatar, &mut resolver)
    }

    /// Bind a controller and an avatar. On failure the instance is left
    /// uninitialized.
    pub fn bind_with(
        &mut self,
        graph: Arc<ControllerGraph>,
        avatar: Arc<AvatarConstant>,
        resolver: &mut dyn TargetResolver,
    ) -> Result<(), BuildError> {
        if self.in_flight {
            log::error!("bind of '{}' refused: a tick is in flight", graph.name());
            return Err(BuildError::TickInFlight);
        }
        self.bound = None;
        let binding = match AvatarBinding::build(&avatar, &graph, &self.rig, resolver) {
            Ok(b) => b,
            Err(e) => {
                log::error!("binding avatar '{}' to '{}' failed: {e}", avatar.name, graph.name());
                return Err(e);
            }
        };
        let mem = InstanceMemory::new(&graph, &binding, &self.config);
        let scratch = Scratch::new(
            &self.config.scratch,
            graph.layers().len(),
            self.rig.len(),
            binding.properties.len(),
            graph.parameters().len(),
        );
        self.recorder = Recorder::new(self.config.recorder_capacity);
        self.bound = Some(Bound {
            graph,
            avatar,
            binding,
            mem,
            scratch,
            last_dt: 0.0,
        });
        Ok(())
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.bound.is_some()
    }

    pub fn rig(&self) -> &SceneRig {
        &self.rig
    }

    pub fn config(&self) -> &AnimatorConfig {
        &self.config
    }

    pub fn graph(&self) -> Option<&Arc<ControllerGraph>> {
        self.bound.as_ref().map(|b| &b.graph)
    }

    pub fn avatar(&self) -> Option<&Arc<AvatarConstant>> {
        self.bound.as_ref().map(|b| &b.avatar)
    }

    pub fn memory(&self) -> Option<&InstanceMemory> {
        self.bound.as_ref().map(|b| &b.mem)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// True when the current visibility and culling mode skip retargeting
    /// and pose writes.
    pub fn is_culled(&self) -> bool {
        self.culled(CullingMode::CullUpdateTransforms)
    }

    fn culled(&self, mode: CullingMode) -> bool {
        !self.visible && self.config.culling >= mode
    }

    fn bound(&self, what: &str) -> Result<&Bound, AnimatorError> {
        self.bound
            .as_ref()
            .ok_or_else(|| usage(AnimatorError::NotInitialized, what))
    }

    fn bound_mut(&mut self, what: &str) -> Result<&mut Bound, AnimatorError> {
        if self.bound.is_none() {
            return Err(usage(AnimatorError::NotInitialized, what));
        }
        if self.recorder.is_playing() {
            return Err(usage(AnimatorError::PlaybackMode, what));
        }
        self.bound
            .as_mut()
            .ok_or_else(|| usage(AnimatorError::NotInitialized, what))
    }

    // ---- pipeline -------------------------------------------------------

    /// Run all six stages for a single-instance host.
    pub fn tick(&mut self, dt: f32) {
        self.tick_with(dt, &mut NoCallbacks);
    }

    pub fn tick_with(&mut self, dt: f32, callbacks: &mut dyn AnimatorCallbacks) {
        self.evaluate(dt);
        self.drain_callbacks(callbacks);
        self.retarget_and_solve();
        self.run_ik_callbacks(callbacks);
        self.write_pose();
        self.capture();
    }

    /// Stage 1.
    pub fn evaluate(&mut self, dt: f32) {
        let playing = self.recorder.is_playing();
        let culled = self.culled(CullingMode::CullCompletely);
        let speed = self.config.speed;
        let apply_root_motion = self.config.apply_root_motion;
        let max_events = self.config.max_events_per_tick;
        let Some(b) = self.bound.as_mut() else { return };
        self.in_flight = true;
        b.last_dt = dt;

        b.mem.events.clear();
        b.mem.root_motion = RootMotion::default();

        if playing {
            if let Some(frame) = self.recorder.current() {
                b.mem = frame.clone();
            }
            b.mem.events.clear();
            b.mem.root_motion = RootMotion::default();
            b.mem.dirty = true;
            return;
        }
        if culled {
            return;
        }
        evaluate_bound(b, dt, speed, apply_root_motion);
        if b.mem.events.len() > max_events {
            log::warn!(
                "animator dropped {} events over the per-tick limit of {max_events}",
                b.mem.events.len() - max_events
            );
            b.mem.events.truncate(max_events);
        }
    }

    /// Stage 2: events in queue order, then root motion.
    pub fn drain_callbacks(&mut self, callbacks: &mut dyn AnimatorCallbacks) {
        let apply = self.config.apply_root_motion;
        let Some(b) = self.bound.as_mut() else { return };
        let mem = &mut b.mem;
        for event in &mem.events {
            callbacks.on_animation_event(event);
        }
        mem.events.clear();
        let motion = mem.root_motion;
        if !callbacks.on_animator_move(&motion, &mut mem.root) && apply {
            mem.root.apply(&motion);
        }
    }

    /// Stage 3.
    pub fn retarget_and_solve(&mut self) {
        if self.culled(CullingMode::CullUpdateTransforms) {
            return;
        }
        if let Some(b) = self.bound.as_mut() {
            solve_pose(b);
        }
    }

    /// Stage 4: per-layer IK hooks for layers with an IK pass.
    pub fn run_ik_callbacks(&mut self, callbacks: &mut dyn AnimatorCallbacks) {
        if self.culled(CullingMode::CullUpdateTransforms) || self.recorder.is_playing() {
            return;
        }
        let Some(b) = self.bound.as_mut() else { return };
        if !b.avatar.is_humanoid() {
            return;
        }
        let graph = Arc::clone(&b.graph);
        for (i, layer) in graph.layers().iter().enumerate() {
            if !layer.ik_pass {
                continue;
            }
            if b.mem.dirty {
                solve_pose(b);
            }
            callbacks.on_animator_ik(i, &mut b.goal_view());
        }
    }

    /// Stage 5.
    pub fn write_pose(&mut self) {
        if self.culled(CullingMode::CullUpdateTransforms) {
            return;
        }
        let Some(b) = self.bound.as_mut() else { return };
        if b.mem.dirty {
            solve_pose(b);
        }
        let mem = &b.mem;
        match self.rig.mode() {
            RigMode::Hierarchy => {
                for (i, local) in mem.locals.iter().enumerate() {
                    self.rig.set_local(i, *local);
                }
                self.rig.update_globals();
            }
            RigMode::Optimized => {
                for (i, global) in mem.globals.iter().enumerate() {
                    self.rig.set_global(i, *global);
                }
            }
        }
    }

    /// Stage 6.
    pub fn capture(&mut self) {
        self.in_flight = false;
        if let Some(b) = self.bound.as_ref() {
            self.recorder.capture(b.last_dt, &b.mem);
        }
    }

    /// Generic property writes produced by the last evaluate.
    pub fn take_writes(&mut self) -> WriteBatch {
        self.bound
            .as_mut()
            .map(|b| std::mem::take(&mut b.mem.writes))
            .unwrap_or_default()
    }

    /// Events queued by the last evaluate and not yet drained.
    pub fn pending_events(&self) -> &[AnimatorEvent] {
        self.bound.as_ref().map_or(&[], |b| b.mem.events.as_slice())
    }

    // ---- parameters -----------------------------------------------------

    pub fn get_parameter(&self, id: impl Into<ParameterId>) -> Result<ParameterValue, AnimatorError> {
        let b = self.bound("get_parameter")?;
        b.mem.values.get(id).map_err(|e| usage(e.into(), "get_parameter"))
    }

    pub fn get_float(&self, id: impl Into<ParameterId>) -> Result<f32, AnimatorError> {
        let b = self.bound("get_float")?;
        b.mem.values.get_float(id).map_err(|e| usage(e.into(), "get_float"))
    }

    pub fn get_int(&self, id: impl Into<ParameterId>) -> Result<i32, AnimatorError> {
        let b = self.bound("get_int")?;
        b.mem.values.get_int(id).map_err(|e| usage(e.into(), "get_int"))
    }

    pub fn get_bool(&self, id: impl Into<ParameterId>) -> Result<bool, AnimatorError> {
        let b = self.bound("get_bool")?;
        b.mem.values.get_bool(id).map_err(|e| usage(e.into(), "get_bool"))
    }

    pub fn set_parameter(&mut self, id: impl Into<ParameterId>, value: ParameterValue) -> Result<(), AnimatorError> {
        let b = self.bound_mut("set_parameter")?;
        b.mem.values.set(id, value).map_err(|e| usage(e.into(), "set_parameter"))
    }

    pub fn set_float(&mut self, id: impl Into<ParameterId>, value: f32) -> Result<(), AnimatorError> {
        self.set_parameter(id, ParameterValue::Float(value))
    }

    pub fn set_int(&mut self, id: impl Into<ParameterId>, value: i32) -> Result<(), AnimatorError> {
        self.set_parameter(id, ParameterValue::Int(value))
    }

    pub fn set_bool(&mut self, id: impl Into<ParameterId>, value: bool) -> Result<(), AnimatorError> {
        self.set_parameter(id, ParameterValue::Bool(value))
    }

    pub fn set_trigger(&mut self, id: impl Into<ParameterId>) -> Result<(), AnimatorError> {
        let b = self.bound_mut("set_trigger")?;
        b.mem.values.set_trigger(id).map_err(|e| usage(e.into(), "set_trigger"))
    }

    pub fn reset_trigger(&mut self, id: impl Into<ParameterId>) -> Result<(), AnimatorError> {
        let b = self.bound_mut("reset_trigger")?;
        b.mem.values.reset_trigger(id).map_err(|e| usage(e.into(), "reset_trigger"))
    }

    // ---- states ---------------------------------------------------------

    /// Jump to a state at the next tick. `state` matches the state name or
    /// its full `layer.state` path.
    pub fn play(&mut self, layer: usize, state: NameHash, normalized_time: f32) -> Result<(), AnimatorError> {
        self.request(layer, state, "play", |state| StateRequest::Play {
            state,
            normalized_time,
        })
    }

    /// Blend into a state over `duration` seconds, starting at the next tick.
    pub fn cross_fade(
        &mut self,
        layer: usize,
        state: NameHash,
        duration: f32,
        normalized_time: f32,
    ) -> Result<(), AnimatorError> {
        self.request(layer, state, "cross_fade", |state| StateRequest::CrossFade {
            state,
            duration,
            normalized_time,
        })
    }

    fn request(
        &mut self,
        layer: usize,
        state: NameHash,
        what: &str,
        make: impl FnOnce(usize) -> StateRequest,
    ) -> Result<(), AnimatorError> {
        let b = self.bound_mut(what)?;
        let (owner, sm) = b
            .graph
            .machine(layer)
            .ok_or_else(|| usage(AnimatorError::InvalidIndex, what))?;
        let index = sm
            .find(state)
            .ok_or_else(|| usage(AnimatorError::DoesNotExist, what))?;
        match b.mem.machines.get_mut(owner).and_then(Option::as_mut) {
            Some(m) => {
                m.request(make(index));
                Ok(())
            }
            None => Err(usage(AnimatorError::InvalidIndex, what)),
        }
    }

    fn machine_memory(&self, layer: usize, what: &str) -> Result<(&Bound, usize, &StateMachineMemory), AnimatorError> {
        let b = self.bound(what)?;
        let (owner, _) = b
            .graph
            .machine(layer)
            .ok_or_else(|| usage(AnimatorError::InvalidIndex, what))?;
        let m = b.mem.machines[owner]
            .as_ref()
            .ok_or_else(|| usage(AnimatorError::InvalidIndex, what))?;
        Ok((b, owner, m))
    }

    pub fn current_state_info(&self, layer: usize) -> Result<StateInfo, AnimatorError> {
        let (b, _, m) = self.machine_memory(layer, "current_state_info")?;
        Ok(state_info(b, layer, &m.current))
    }

    pub fn next_state_info(&self, layer: usize) -> Result<Option<StateInfo>, AnimatorError> {
        let (b, _, m) = self.machine_memory(layer, "next_state_info")?;
        Ok(m.transition.as_ref().map(|t| state_info(b, layer, &t.next)))
    }

    pub fn transition_info(&self, layer: usize) -> Result<Option<TransitionInfo>, AnimatorError> {
        let (b, owner, m) = self.machine_memory(layer, "transition_info")?;
        let Some(t) = m.transition.as_ref() else {
            return Ok(None);
        };
        let destination = b
            .graph
            .state(owner, t.next.state)
            .map_or(name_hash(""), |s| s.name_hash);
        Ok(Some(TransitionInfo {
            name_hash: t.name_hash,
            destination,
            normalized_time: t.progress,
            duration: t.duration,
            any_state: t.source == TransitionSource::AnyState,
            user: t.source == TransitionSource::Request,
        }))
    }

    pub fn is_in_transition(&self, layer: usize) -> Result<bool, AnimatorError> {
        let (_, _, m) = self.machine_memory(layer, "is_in_transition")?;
        Ok(m.is_in_transition())
    }

    pub fn layer_count(&self) -> usize {
        self.bound.as_ref().map_or(0, |b| b.graph.layers().len())
    }

    pub fn layer_index(&self, name: &str) -> Result<usize, AnimatorError> {
        let b = self.bound("layer_index")?;
        b.graph
            .layer_index(name)
            .ok_or_else(|| usage(AnimatorError::DoesNotExist, "layer_index"))
    }

    pub fn layer_weight(&self, layer: usize) -> Result<f32, AnimatorError> {
        let b = self.bound("layer_weight")?;
        b.mem
            .layer_weights
            .get(layer)
            .copied()
            .ok_or_else(|| usage(AnimatorError::InvalidIndex, "layer_weight"))
    }

    /// Layer 0 always weighs 1; setting it is accepted and ignored.
    pub fn set_layer_weight(&mut self, layer: usize, weight: f32) -> Result<(), AnimatorError> {
        let b = self.bound_mut("set_layer_weight")?;
        let slot = b
            .mem
            .layer_weights
            .get_mut(layer)
            .ok_or_else(|| usage(AnimatorError::InvalidIndex, "set_layer_weight"))?;
        if layer != 0 {
            *slot = weight.clamp(0.0, 1.0);
        }
        Ok(())
    }

    // ---- goals ----------------------------------------------------------

    pub fn goal_position(&self, goal: AvatarGoal) -> Result<Vec3, AnimatorError> {
        let b = self.bound("goal_position")?;
        Ok(world_goal_position(&b.mem, goal))
    }

    pub fn goal_rotation(&self, goal: AvatarGoal) -> Result<Quat, AnimatorError> {
        let b = self.bound("goal_rotation")?;
        Ok(world_goal_rotation(&b.mem, goal))
    }

    pub fn goal_position_weight(&self, goal: AvatarGoal) -> Result<f32, AnimatorError> {
        let b = self.bound("goal_position_weight")?;
        Ok(b.mem.goals[goal.index()].position_weight)
    }

    pub fn goal_rotation_weight(&self, goal: AvatarGoal) -> Result<f32, AnimatorError> {
        let b = self.bound("goal_rotation_weight")?;
        Ok(b.mem.goals[goal.index()].rotation_weight)
    }

    pub fn set_goal_position(&mut self, goal: AvatarGoal, position: Vec3) -> Result<(), AnimatorError> {
        let b = self.bound_mut("set_goal_position")?;
        b.goal_view().set_goal_position(goal, position);
        Ok(())
    }

    pub fn set_goal_rotation(&mut self, goal: AvatarGoal, rotation: Quat) -> Result<(), AnimatorError> {
        let b = self.bound_mut("set_goal_rotation")?;
        b.goal_view().set_goal_rotation(goal, rotation);
        Ok(())
    }

    pub fn set_goal_position_weight(&mut self, goal: AvatarGoal, weight: f32) -> Result<(), AnimatorError> {
        let b = self.bound_mut("set_goal_position_weight")?;
        b.goal_view().set_goal_position_weight(goal, weight);
        Ok(())
    }

    pub fn set_goal_rotation_weight(&mut self, goal: AvatarGoal, weight: f32) -> Result<(), AnimatorError> {
        let b = self.bound_mut("set_goal_rotation_weight")?;
        b.goal_view().set_goal_rotation_weight(goal, weight);
        Ok(())
    }

    /// Stop following host positions and rotations for `goal`.
    pub fn clear_goal(&mut self, goal: AvatarGoal) -> Result<(), AnimatorError> {
        let b = self.bound_mut("clear_goal")?;
        b.mem.goals[goal.index()] = GoalState::default();
        b.mem.dirty = true;
        Ok(())
    }

    pub fn human_pose(&self) -> Option<&HumanPose> {
        self.bound
            .as_ref()
            .filter(|b| b.avatar.is_humanoid())
            .map(|b| &b.mem.pose)
    }

    // ---- target matching ------------------------------------------------

    /// Start matching `target` to a world pose over `[start, end]` of the
    /// current state's normalized time on layer 0. Replaces any active match.
    pub fn match_target(
        &mut self,
        target: AvatarTarget,
        position: Vec3,
        rotation: Quat,
        mask: MatchTargetWeightMask,
        start: f32,
        end: f32,
    ) -> Result<(), AnimatorError> {
        let b = self.bound_mut("match_target")?;
        if target.goal().is_some() && !b.avatar.is_humanoid() {
            return Err(usage(AnimatorError::InvalidIndex, "match_target"));
        }
        let state = b.mem.machines.first().and_then(Option::as_ref).map(|m| m.current.state);
        let Some(state) = state else {
            return Err(usage(AnimatorError::InvalidIndex, "match_target"));
        };
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        b.mem.target_match = Some(TargetMatch {
            target,
            position,
            rotation,
            mask,
            start,
            end,
            state,
        });
        Ok(())
    }

    /// Cancel the active match. With `complete`, the remaining correction is
    /// applied to the root at once.
    pub fn interrupt_match_target(&mut self, complete: bool) -> Result<(), AnimatorError> {
        let b = self.bound_mut("interrupt_match_target")?;
        let Some(m) = b.mem.target_match.take() else {
            return Ok(());
        };
        if complete {
            let local = target_local(&b.mem, m.target);
            let correction = m.correct(&b.mem.root, &RootMotion::default(), local, 1.0);
            b.mem.root.apply(&correction);
        }
        Ok(())
    }

    pub fn is_matching_target(&self) -> bool {
        self.bound
            .as_ref()
            .is_some_and(|b| b.mem.target_match.is_some())
    }

    // ---- out-of-band sampling -------------------------------------------

    /// Pose `rig` with a single clip at `time` seconds. The rig must have the
    /// layout of this animator's rig. Instance memory is untouched.
    pub fn sample(&self, clip: ClipId, time: f32, rig: &mut SceneRig) -> Result<(), AnimatorError> {
        let b = self.bound("sample")?;
        if rig.len() != self.rig.len() {
            return Err(usage(AnimatorError::InvalidIndex, "sample"));
        }
        let data = b
            .graph
            .clip(clip)
            .ok_or_else(|| usage(AnimatorError::DoesNotExist, "sample"))?;
        let normalized = if data.duration > 0.0 { time / data.duration } else { 0.0 };
        let leaf = ActiveLeaf {
            clip,
            weight: 1.0,
            mirror: false,
            prev: normalized,
            cur: normalized,
            inclusive: false,
        };
        let binding = &b.binding;
        let mut pose = crate::accumulate::LayerPose::new(rig.len(), binding.properties.len(), b.graph.parameters().len());
        let mut human = HumanPose::default();
        let ctx = SampleCtx {
            binding,
            parameter_targets: b.graph.parameter_curve_targets(clip),
            root_motion: false,
        };
        sample_leaf(&ctx, data, &leaf, &mut human, &mut pose);
        pose.finish();

        let mut locals = binding.bind_locals.clone();
        for (i, acc) in pose.bones.iter().enumerate() {
            if let Some(t) = acc.get() {
                locals[i] = t;
            }
        }
        let mut globals = vec![Transform::IDENTITY; locals.len()];
        retarget::forward(&binding.parents, &locals, &mut globals);
        if let Some(human_c) = &b.avatar.human {
            copy_pose(binding, &pose, &mut human);
            retarget::muscles_to_locals(human_c, binding, &human, &mut locals);
            retarget::forward(&binding.parents, &locals, &mut globals);
            retarget::place_body(binding, &human, &mut locals, &mut globals);
        }
        for (i, local) in locals.iter().enumerate() {
            rig.set_local(i, *local);
        }
        rig.update_globals();
        Ok(())
    }

    // ---- recorder -------------------------------------------------------

    pub fn start_recording(&mut self) -> Result<(), AnimatorError> {
        self.bound_mut("start_recording")?;
        self.recorder.start_recording();
        Ok(())
    }

    pub fn stop_recording(&mut self) {
        self.recorder.stop_recording();
    }

    pub fn start_playback(&mut self) -> Result<(), AnimatorError> {
        self.bound("start_playback")?;
        self.recorder.stop_recording();
        if self.recorder.start_playback() {
            Ok(())
        } else {
            Err(usage(AnimatorError::DoesNotExist, "start_playback"))
        }
    }

    pub fn set_playback_time(&mut self, time: f32) {
        self.recorder.set_playback_time(time);
    }

    pub fn playback_time(&self) -> f32 {
        self.recorder.playback_time()
    }

    pub fn stop_playback(&mut self) {
        self.recorder.stop_playback();
    }

    pub fn recorder_mode(&self) -> RecorderMode {
        self.recorder.mode()
    }

    pub fn recorder_start_time(&self) -> Option<f32> {
        self.recorder.start_time()
    }

    pub fn recorder_stop_time(&self) -> Option<f32> {
        self.recorder.stop_time()
    }

    // ---- playback settings and root ---------------------------------------

    pub fn speed(&self) -> f32 {
        self.config.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.config.speed = speed;
    }

    pub fn apply_root_motion(&self) -> bool {
        self.config.apply_root_motion
    }

    pub fn set_apply_root_motion(&mut self, on: bool) {
        self.config.apply_root_motion = on;
    }

    pub fn root_motion(&self) -> RootMotion {
        self.bound.as_ref().map_or_else(RootMotion::default, |b| b.mem.root_motion)
    }

    pub fn root_position(&self) -> Vec3 {
        self.bound.as_ref().map_or(Vec3::ZERO, |b| b.mem.root.position)
    }

    pub fn root_rotation(&self) -> Quat {
        self.bound.as_ref().map_or(Quat::IDENTITY, |b| b.mem.root.rotation)
    }

    pub fn set_root(&mut self, root: RootTransform) -> Result<(), AnimatorError> {
        let b = self.bound_mut("set_root")?;
        b.mem.root = root;
        Ok(())
    }
}

fn state_info(b: &Bound, layer: usize, time: &StateTime) -> StateInfo {
    let graph = &b.graph;
    let looping = graph
        .state_motion(layer, time.state)
        .is_some_and(|m| m.is_looping(graph));
    match graph.state(layer, time.state) {
        Some(s) => StateInfo {
            index: time.state,
            name_hash: s.name_hash,
            full_path_hash: s.path_hash,
            tag_hash: s.tag_hash,
            normalized_time: time.normalized,
            length: time.duration,
            speed: s.speed * s.speed_parameter.map_or(1.0, |p| b.mem.values.float_at(p)),
            looping,
        },
        None => StateInfo {
            index: time.state,
            name_hash: name_hash(""),
            full_path_hash: name_hash(""),
            tag_hash: name_hash(""),
            normalized_time: time.normalized,
            length: time.duration,
            speed: 0.0,
            looping,
        },
    }
}

fn coerce(v: &Value, kind: ValueKind) -> Value {
    match kind {
        ValueKind::Float => Value::Float(to_float(v)),
        ValueKind::Bool => Value::Bool(to_bool(v)),
        ValueKind::ObjectRef => Value::ObjectRef(to_object_ref(v)),
        ValueKind::Int => Value::Int(to_float(v).round() as i32),
    }
}

/// Copy a finished accumulator into a human pose. Goals no clip animated keep
/// their previous placement but lose `valid`; a missing body falls back to the
/// bind-pose hips.
fn copy_pose(binding: &AvatarBinding, out: &crate::accumulate::LayerPose, pose: &mut HumanPose) {
    pose.muscles.copy_from_slice(&out.muscles);
    if out.body_w > 0.0 {
        pose.body_position = out.body_position;
        pose.body_rotation = out.body_rotation.get().unwrap_or(Quat::IDENTITY);
    } else {
        pose.body_position = binding
            .node(HumanBone::Hips)
            .map_or(Vec3::ZERO, |h| binding.bind_globals[h].translation);
        pose.body_rotation = Quat::IDENTITY;
    }
    for (slot, acc) in pose.goals.iter_mut().zip(&out.goals) {
        if acc.w > 0.0 {
            slot.position = acc.position;
            slot.rotation = acc.rotation.get().unwrap_or(Quat::IDENTITY);
            slot.valid = true;
        } else {
            slot.valid = false;
        }
    }
}

fn evaluate_bound(b: &mut Bound, dt: f32, speed: f32, apply_root_motion: bool) {
    let Bound {
        graph,
        avatar,
        binding,
        mem,
        scratch,
        ..
    } = b;
    let graph: &ControllerGraph = &**graph;

    for (i, layer) in graph.layers().iter().enumerate() {
        let LayerSource::Machine(sm) = &layer.source else {
            continue;
        };
        let Some(m) = mem.machines[i].as_mut() else {
            continue;
        };
        let ctx = StepCtx {
            graph,
            layer: i,
            layer_weights: &mem.layer_weights,
            speed,
        };
        state_machine::step(&ctx, sm, m, &mut mem.values, dt, &mut mem.events, &mut scratch.durations);
    }

    scratch.begin_frame();
    for (i, _) in graph.layers().iter().enumerate() {
        scratch.layers[i].clear();
        let Some((owner, sm)) = graph.machine(i) else {
            continue;
        };
        let Some(m) = mem.machines[owner].as_ref() else {
            continue;
        };
        scratch.active.clear();
        for (time, w) in m.weighted_states() {
            let Some(motion) = graph.state_motion(i, time.state) else {
                continue;
            };
            let state = &sm.states[time.state];
            scratch.leaves.clear();
            blend_tree::flatten(
                graph,
                motion,
                &mem.values,
                w,
                state.cycle_offset,
                state.mirror,
                &mut scratch.weights,
                &mut scratch.leaves,
            );
            for leaf in &scratch.leaves {
                scratch.active.push(ActiveLeaf {
                    clip: leaf.clip,
                    weight: leaf.weight,
                    mirror: leaf.mirror,
                    prev: time.prev_normalized + leaf.cycle_offset,
                    cur: time.normalized + leaf.cycle_offset,
                    inclusive: time.window_includes_start(),
                });
            }
        }
        let pose = &mut scratch.layers[i];
        for leaf in &scratch.active {
            let Some(clip) = graph.clip(leaf.clip) else {
                continue;
            };
            let ctx = SampleCtx {
                binding,
                parameter_targets: graph.parameter_curve_targets(leaf.clip),
                root_motion: apply_root_motion,
            };
            sample_leaf(&ctx, clip, leaf, &mut scratch.human, pose);
            if leaf.weight > 0.0 {
                clip.for_each_event_crossed(leaf.prev, leaf.cur, leaf.inclusive, |ev| {
                    mem.events.push(AnimatorEvent::Animation {
                        layer: i,
                        clip: clip.name.clone(),
                        name: ev.name.clone(),
                        payload: ev.payload.clone(),
                        time: ev.time,
                        weight: leaf.weight,
                    });
                });
            }
        }
        pose.finish();
    }

    let rig = BlendRig {
        paths: &binding.paths,
        bind: &binding.bind_locals,
    };
    for (i, layer) in graph.layers().iter().enumerate() {
        let (w, blending) = if i == 0 {
            (1.0, LayerBlending::Override)
        } else {
            (mem.layer_weights[i], layer.blending)
        };
        blend_layer(&mut scratch.output, &scratch.layers[i], w, blending, layer.mask.as_ref(), &rig);
    }
    let out = &scratch.output;

    for (idx, &(v, w)) in out.parameters.iter().enumerate() {
        if w > 0.0 {
            mem.values.write_curve(idx, v);
        }
    }

    mem.writes.clear();
    for (slot, entry) in out.properties.iter().enumerate() {
        let Some(v) = entry.as_ref().and_then(AccumEntry::finalize) else {
            continue;
        };
        let prop = &binding.properties[slot];
        mem.writes
            .push(PropertyWrite::new(prop.path.clone(), coerce(&v, prop.handle.kind)));
    }

    if avatar.is_humanoid() {
        copy_pose(binding, out, &mut mem.pose);
    }
    mem.anim_locals.copy_from_slice(&binding.bind_locals);
    for (i, acc) in out.bones.iter().enumerate() {
        if let Some(t) = acc.get() {
            mem.anim_locals[i] = t;
        }
    }

    let mut motion = out.root_motion();
    let current = mem.machines.first().and_then(Option::as_ref).map(|m| m.current);
    if let (Some(m), Some(cur)) = (mem.target_match, current) {
        if cur.state != m.state {
            mem.target_match = None;
        } else if let Some(alpha) = m.alpha(cur.prev_normalized, cur.normalized) {
            if let (Some(human), Some(_)) = (&avatar.human, m.target.goal()) {
                pose_human(human, binding, mem);
            }
            let local = target_local(mem, m.target);
            motion = m.correct(&mem.root, &motion, local, alpha);
            if m.is_complete(cur.normalized) {
                mem.target_match = None;
            }
        }
    }
    mem.root_motion = motion;

    mem.foot_ik = current
        .and_then(|c| graph.state(0, c.state))
        .is_some_and(|s| s.foot_ik);
    mem.dirty = true;
}

/// Pose of a match target in the root frame.
fn target_local(mem: &InstanceMemory, target: AvatarTarget) -> Transform {
    match target {
        AvatarTarget::Root => Transform::IDENTITY,
        AvatarTarget::Body => Transform::from_translation_rotation(mem.pose.body_position, mem.pose.body_rotation),
        _ => match target.goal() {
            Some(goal) => {
                let g = &mem.pose.goals[goal.index()];
                Transform::from_translation_rotation(g.position, g.rotation)
            }
            None => Transform::IDENTITY,
        },
    }
}

/// Forward kinematics of the current human pose into `mem.locals` and
/// `mem.globals`; goals no clip animated are read back from the result.
fn pose_human(human: &HumanConstant, binding: &AvatarBinding, mem: &mut InstanceMemory) {
    mem.locals.copy_from_slice(&mem.anim_locals);
    retarget::muscles_to_locals(human, binding, &mem.pose, &mut mem.locals);
    retarget::forward(&binding.parents, &mem.locals, &mut mem.globals);
    retarget::place_body(binding, &mem.pose, &mut mem.locals, &mut mem.globals);
    retarget::fill_goals_from_fk(binding, &mut mem.pose, &mem.globals);
}

fn solve_pose(b: &mut Bound) {
    let Bound {
        avatar, binding, mem, ..
    } = b;
    mem.dirty = false;
    let Some(human) = &avatar.human else {
        mem.locals.copy_from_slice(&mem.anim_locals);
        retarget::forward(&binding.parents, &mem.locals, &mut mem.globals);
        return;
    };
    pose_human(human, binding, mem);

    let mut goals = mem.pose.goals;
    retarget::apply_feet_spacing(binding, human.description.feet_spacing, mem.pose.body_rotation, &mut goals);
    let mut targets = [IkTarget {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        position_weight: 0.0,
        rotation_weight: 0.0,
    }; GOAL_COUNT];
    for goal in AvatarGoal::ALL {
        let g = goals[goal.index()];
        let host = mem.goals[goal.index()];
        let auto = if goal.is_foot() && mem.foot_ik && g.valid { 1.0 } else { 0.0 };
        targets[goal.index()] = IkTarget {
            position: host.position.map_or(g.position, |p| mem.to_root_frame(p)),
            rotation: host
                .rotation
                .map_or(g.rotation, |q| (mem.root.rotation.inverse() * q).normalize()),
            position_weight: host.position_weight.max(auto),
            rotation_weight: host.rotation_weight.max(auto),
        };
    }
    retarget::solve_goals(human, binding, &targets, &mut mem.locals, &mut mem.globals);
}

fn world_goal_position(mem: &InstanceMemory, goal: AvatarGoal) -> Vec3 {
    let host = mem.goals[goal.index()];
    host.position
        .unwrap_or_else(|| mem.root.position + mem.root.rotation * mem.pose.goals[goal.index()].position)
}

fn world_goal_rotation(mem: &InstanceMemory, goal: AvatarGoal) -> Quat {
    let host = mem.goals[goal.index()];
    host.rotation
        .unwrap_or_else(|| (mem.root.rotation * mem.pose.goals[goal.index()].rotation).normalize())
}

/// Goal access handed to IK callbacks; any write marks the pose for re-solve.
struct GoalView<'a> {
    binding: &'a AvatarBinding,
    mem: &'a mut InstanceMemory,
}

impl IkGoals for GoalView<'_> {
    fn goal_position(&self, goal: AvatarGoal) -> Vec3 {
        world_goal_position(self.mem, goal)
    }

    fn bone_position(&self, bone: HumanBone) -> Option<Vec3> {
        let node = self.binding.node(bone)?;
        let root = &self.mem.root;
        Some(root.position + root.rotation * self.mem.globals[node].translation)
    }

    fn goal_rotation(&self, goal: AvatarGoal) -> Quat {
        world_goal_rotation(self.mem, goal)
    }

    fn set_goal_position(&mut self, goal: AvatarGoal, position: Vec3) {
        self.mem.goals[goal.index()].position = Some(position);
        self.mem.dirty = true;
    }

    fn set_goal_rotation(&mut self, goal: AvatarGoal, rotation: Quat) {
        self.mem.goals[goal.index()].rotation = Some(rotation.normalize());
        self.mem.dirty = true;
    }

    fn set_goal_position_weight(&mut self, goal: AvatarGoal, weight: f32) {
        self.mem.goals[goal.index()].position_weight = weight.clamp(0.0, 1.0);
        self.mem.dirty = true;
    }

    fn set_goal_rotation_weight(&mut self, goal: AvatarGoal, weight: f32) {
        self.mem.goals[goal.index()].rotation_weight = weight.clamp(0.0, 1.0);
        self.mem.dirty = true;
    }
}
