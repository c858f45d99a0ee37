//! Controller authoring definitions and the immutable `ControllerGraph` built
//! from them.
//!
//! Definitions reference clips, blend trees, states and parameters by name.
//! `ControllerGraph::build` resolves every name to an index once, validates the
//! result and returns an `Arc` shared by all instances. Structural edits go
//! through the definition and a rebuild; the graph itself never changes.

use std::sync::Arc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::blend_tree::{BlendChild, BlendTree, BlendType};
use crate::clip::AnimationClip;
use crate::error::BuildError;
use crate::ids::{name_hash, BlendTreeId, ClipId, FastMap, NameHash};
use crate::mask::AvatarMask;
use crate::motion::Motion;
use crate::state_machine::{
    Condition, ConditionMode, DurationMode, State, StateMachine, Transition,
};
use crate::values::{ParameterDef, ParameterSchema, ParameterType};

fn one() -> f32 {
    1.0
}

fn yes() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionDef {
    Clip(String),
    BlendTree(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionDef {
    pub mode: ConditionMode,
    #[serde(default)]
    pub parameter: String,
    #[serde(default)]
    pub threshold: f32,
}

impl ConditionDef {
    pub fn new(mode: ConditionMode, parameter: impl Into<String>, threshold: f32) -> Self {
        Self {
            mode,
            parameter: parameter.into(),
            threshold,
        }
    }

    pub fn exit_time(exit: f32) -> Self {
        Self::new(ConditionMode::ExitTime, "", exit)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionDef {
    #[serde(default)]
    pub name: Option<String>,
    pub destination: String,
    #[serde(default)]
    pub conditions: Vec<ConditionDef>,
    #[serde(default)]
    pub duration: f32,
    #[serde(default)]
    pub duration_mode: DurationMode,
    #[serde(default)]
    pub offset: f32,
    #[serde(default = "yes")]
    pub atomic: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub can_transition_to_self: bool,
}

impl TransitionDef {
    pub fn to(destination: impl Into<String>) -> Self {
        Self {
            name: None,
            destination: destination.into(),
            conditions: Vec::new(),
            duration: 0.0,
            duration_mode: DurationMode::Seconds,
            offset: 0.0,
            atomic: true,
            solo: false,
            mute: false,
            can_transition_to_self: false,
        }
    }

    pub fn when(mut self, condition: ConditionDef) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn over(mut self, seconds: f32) -> Self {
        self.duration = seconds;
        self
    }

    pub fn interruptible(mut self) -> Self {
        self.atomic = false;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub motion: Option<MotionDef>,
    #[serde(default = "one")]
    pub speed: f32,
    #[serde(default)]
    pub speed_parameter: Option<String>,
    #[serde(default)]
    pub mirror: bool,
    #[serde(default)]
    pub foot_ik: bool,
    #[serde(default)]
    pub cycle_offset: f32,
    #[serde(default)]
    pub transitions: Vec<TransitionDef>,
}

impl StateDef {
    pub fn new(name: impl Into<String>, motion: Option<MotionDef>) -> Self {
        Self {
            name: name.into(),
            tag: String::new(),
            motion,
            speed: 1.0,
            speed_parameter: None,
            mirror: false,
            foot_ik: false,
            cycle_offset: 0.0,
            transitions: Vec::new(),
        }
    }

    pub fn with_transition(mut self, t: TransitionDef) -> Self {
        self.transitions.push(t);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMachineDef {
    #[serde(default)]
    pub states: Vec<StateDef>,
    #[serde(default)]
    pub any_state: Vec<TransitionDef>,
    /// First state when unset.
    #[serde(default)]
    pub default_state: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LayerBlending {
    #[default]
    Override,
    Additive,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerDef {
    pub name: String,
    #[serde(default = "one")]
    pub weight: f32,
    #[serde(default)]
    pub blending: LayerBlending,
    #[serde(default)]
    pub mask: Option<AvatarMask>,
    #[serde(default)]
    pub ik_pass: bool,
    #[serde(default)]
    pub synced_layer: Option<usize>,
    #[serde(default)]
    pub synced_affects_timing: bool,
    #[serde(default)]
    pub state_machine: StateMachineDef,
    /// Motion override per state of the reference machine (synced layers).
    #[serde(default)]
    pub synced_motions: Vec<Option<MotionDef>>,
}

impl LayerDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: 1.0,
            blending: LayerBlending::Override,
            mask: None,
            ik_pass: false,
            synced_layer: None,
            synced_affects_timing: false,
            state_machine: StateMachineDef::default(),
            synced_motions: Vec::new(),
        }
    }

    pub fn synced_to(name: impl Into<String>, layer: usize, motions: Vec<Option<MotionDef>>) -> Self {
        Self {
            synced_layer: Some(layer),
            synced_motions: motions,
            ..Self::new(name)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendChildDef {
    pub motion: MotionDef,
    #[serde(default)]
    pub threshold: f32,
    #[serde(default)]
    pub position: Vec2,
    #[serde(default = "one")]
    pub time_scale: f32,
    #[serde(default)]
    pub cycle_offset: f32,
    #[serde(default)]
    pub mirror: bool,
}

impl BlendChildDef {
    pub fn at_threshold(motion: MotionDef, threshold: f32) -> Self {
        Self {
            motion,
            threshold,
            position: Vec2::ZERO,
            time_scale: 1.0,
            cycle_offset: 0.0,
            mirror: false,
        }
    }

    pub fn at_position(motion: MotionDef, position: Vec2) -> Self {
        Self {
            position,
            ..Self::at_threshold(motion, 0.0)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendTreeDef {
    pub name: String,
    pub blend_type: BlendType,
    #[serde(default)]
    pub parameter: String,
    #[serde(default)]
    pub parameter_y: Option<String>,
    #[serde(default)]
    children: Vec<BlendChildDef>,
    #[serde(default)]
    automatic_thresholds: bool,
    #[serde(default)]
    min_threshold: f32,
    #[serde(default = "one")]
    max_threshold: f32,
    #[serde(skip, default = "yes")]
    dirty: bool,
    #[serde(skip)]
    cached_thresholds: Vec<f32>,
}

impl BlendTreeDef {
    pub fn new(name: impl Into<String>, blend_type: BlendType, parameter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blend_type,
            parameter: parameter.into(),
            parameter_y: None,
            children: Vec::new(),
            automatic_thresholds: false,
            min_threshold: 0.0,
            max_threshold: 1.0,
            dirty: true,
            cached_thresholds: Vec::new(),
        }
    }

    pub fn with_parameter_y(mut self, parameter: impl Into<String>) -> Self {
        self.parameter_y = Some(parameter.into());
        self
    }

    pub fn with_child(mut self, child: BlendChildDef) -> Self {
        self.add_child(child);
        self
    }

    pub fn children(&self) -> &[BlendChildDef] {
        &self.children
    }

    /// Edit a child in place; the tree is marked dirty.
    pub fn child_mut(&mut self, index: usize) -> Option<&mut BlendChildDef> {
        self.dirty = true;
        self.children.get_mut(index)
    }

    pub fn automatic_thresholds(&self) -> bool {
        self.automatic_thresholds
    }

    pub fn threshold_range(&self) -> (f32, f32) {
        (self.min_threshold, self.max_threshold)
    }

    pub fn add_child(&mut self, child: BlendChildDef) {
        self.children.push(child);
        self.dirty = true;
    }

    pub fn remove_child(&mut self, index: usize) -> Option<BlendChildDef> {
        if index >= self.children.len() {
            return None;
        }
        self.dirty = true;
        Some(self.children.remove(index))
    }

    pub fn set_threshold_range(&mut self, min: f32, max: f32) {
        self.min_threshold = min;
        self.max_threshold = max;
        self.dirty = true;
    }

    pub fn set_automatic_thresholds(&mut self, on: bool) {
        self.automatic_thresholds = on;
        self.dirty = true;
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Effective child thresholds, recomputed only after an edit marked the
    /// tree dirty.
    pub fn thresholds(&mut self) -> &[f32] {
        if self.dirty {
            self.cached_thresholds = self.resolve_thresholds();
            self.dirty = false;
        }
        &self.cached_thresholds
    }

    /// The cache as left by the last `thresholds()` call, unless an edit
    /// marked the tree dirty since.
    pub fn cached_thresholds(&self) -> Option<&[f32]> {
        let clean = !self.dirty && self.cached_thresholds.len() == self.children.len();
        clean.then_some(self.cached_thresholds.as_slice())
    }

    /// Thresholds without touching the cache: evenly spaced across
    /// `[min, max]` in automatic mode, authored values otherwise.
    pub fn resolve_thresholds(&self) -> Vec<f32> {
        let n = self.children.len();
        if !self.automatic_thresholds {
            return self.children.iter().map(|c| c.threshold).collect();
        }
        if n <= 1 {
            return vec![self.min_threshold; n];
        }
        let step = (self.max_threshold - self.min_threshold) / (n - 1) as f32;
        (0..n).map(|i| self.min_threshold + step * i as f32).collect()
    }
}

/// Authoring description of a whole controller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerDef {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub layers: Vec<LayerDef>,
    #[serde(default)]
    pub clips: Vec<AnimationClip>,
    #[serde(default)]
    pub blend_trees: Vec<BlendTreeDef>,
}

impl ControllerDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_layer(&mut self, layer: LayerDef) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    /// Remove a layer and renumber synced references. Layers synced to the
    /// removed one become standalone: they take a copy of its state machine
    /// with their own motions in place of the original ones.
    pub fn remove_layer(&mut self, index: usize) -> Result<LayerDef, BuildError> {
        if index >= self.layers.len() {
            return Err(BuildError::LayerOutOfRange {
                index,
                count: self.layers.len(),
            });
        }
        let removed = self.layers.remove(index);
        for layer in &mut self.layers {
            match layer.synced_layer {
                Some(r) if r == index => {
                    let mut machine = removed.state_machine.clone();
                    for (i, state) in machine.states.iter_mut().enumerate() {
                        state.motion = layer.synced_motions.get(i).cloned().flatten();
                    }
                    layer.state_machine = machine;
                    layer.synced_layer = None;
                    layer.synced_affects_timing = false;
                    layer.synced_motions.clear();
                }
                Some(r) if r > index => layer.synced_layer = Some(r - 1),
                _ => {}
            }
        }
        Ok(removed)
    }

    pub fn build(&self) -> Result<Arc<ControllerGraph>, BuildError> {
        ControllerGraph::build(self)
    }
}

/// Where a layer's state sequence comes from.
#[derive(Clone, Debug)]
pub enum LayerSource {
    Machine(StateMachine),
    /// Replays the machine of `layer` with its own motion per state.
    Synced {
        layer: usize,
        affects_timing: bool,
        motions: Vec<Option<Motion>>,
    },
}

#[derive(Clone, Debug)]
pub struct Layer {
    pub name: String,
    pub name_hash: NameHash,
    /// Initial weight; layer 0 is always 1.
    pub weight: f32,
    pub blending: LayerBlending,
    pub mask: Option<AvatarMask>,
    pub ik_pass: bool,
    pub source: LayerSource,
}

impl Layer {
    pub fn synced_reference(&self) -> Option<usize> {
        match self.source {
            LayerSource::Synced { layer, .. } => Some(layer),
            LayerSource::Machine(_) => None,
        }
    }
}

/// Immutable controller shared by every instance that plays it.
#[derive(Clone, Debug)]
pub struct ControllerGraph {
    name: String,
    schema: Arc<ParameterSchema>,
    layers: Vec<Layer>,
    clips: Vec<AnimationClip>,
    clip_index: FastMap<NameHash, ClipId>,
    blend_trees: Vec<BlendTree>,
    /// Per clip, the schema index driven by each parameter curve.
    parameter_curves: Vec<Vec<Option<usize>>>,
    humanoid: bool,
}

impl ControllerGraph {
    pub fn build(def: &ControllerDef) -> Result<Arc<Self>, BuildError> {
        match Builder::new(def).and_then(Builder::finish) {
            Ok(graph) => {
                log::debug!(
                    "built controller '{}': {} layers, {} clips, {} blend trees, {} parameters",
                    graph.name,
                    graph.layers.len(),
                    graph.clips.len(),
                    graph.blend_trees.len(),
                    graph.schema.len()
                );
                Ok(Arc::new(graph))
            }
            Err(e) => {
                log::error!("controller '{}' rejected: {e}", def.name);
                Err(e)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn parameters(&self) -> &Arc<ParameterSchema> {
        &self.schema
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_index(&self, name: &str) -> Option<usize> {
        let h = name_hash(name);
        self.layers.iter().position(|l| l.name_hash == h)
    }

    #[inline]
    pub fn clip(&self, id: ClipId) -> Option<&AnimationClip> {
        self.clips.get(id.0 as usize)
    }

    pub fn clip_id(&self, name: &str) -> Option<ClipId> {
        self.clip_index.get(&name_hash(name)).copied()
    }

    pub fn clips(&self) -> &[AnimationClip] {
        &self.clips
    }

    #[inline]
    pub fn blend_tree(&self, id: BlendTreeId) -> Option<&BlendTree> {
        self.blend_trees.get(id.0 as usize)
    }

    pub fn blend_trees(&self) -> &[BlendTree] {
        &self.blend_trees
    }

    pub fn parameter_curve_targets(&self, clip: ClipId) -> &[Option<usize>] {
        self.parameter_curves
            .get(clip.0 as usize)
            .map_or(&[], |v| v.as_slice())
    }

    /// Some clip carries muscle or body curves.
    pub fn uses_humanoid_clips(&self) -> bool {
        self.humanoid
    }

    /// Machine that drives `layer`, with the index of the layer owning it.
    pub fn machine(&self, layer: usize) -> Option<(usize, &StateMachine)> {
        match &self.layers.get(layer)?.source {
            LayerSource::Machine(sm) => Some((layer, sm)),
            LayerSource::Synced { layer: r, .. } => match &self.layers.get(*r)?.source {
                LayerSource::Machine(sm) => Some((*r, sm)),
                LayerSource::Synced { .. } => None,
            },
        }
    }

    pub fn state(&self, layer: usize, state: usize) -> Option<&State> {
        self.machine(layer)?.1.states.get(state)
    }

    /// Motion `layer` plays for `state`; synced layers use their overrides.
    pub fn state_motion(&self, layer: usize, state: usize) -> Option<Motion> {
        match &self.layers.get(layer)?.source {
            LayerSource::Machine(sm) => sm.states.get(state)?.motion,
            LayerSource::Synced { motions, .. } => motions.get(state).copied().flatten(),
        }
    }
}

struct Builder<'a> {
    def: &'a ControllerDef,
    schema: ParameterSchema,
    clips: Vec<AnimationClip>,
    clip_index: FastMap<NameHash, ClipId>,
    tree_index: FastMap<NameHash, BlendTreeId>,
}

impl<'a> Builder<'a> {
    fn new(def: &'a ControllerDef) -> Result<Self, BuildError> {
        let mut schema = ParameterSchema::build(&def.parameters)?;
        let mut clips = def.clips.clone();
        let mut clip_index = FastMap::default();
        for (i, clip) in clips.iter_mut().enumerate() {
            clip.prepare();
            clip_index
                .entry(name_hash(&clip.name))
                .or_insert(ClipId(i as u32));
            for curve in &clip.parameters {
                schema.mark_curve_controlled(name_hash(&curve.name));
            }
        }
        let mut tree_index = FastMap::default();
        for (i, tree) in def.blend_trees.iter().enumerate() {
            if tree_index
                .insert(name_hash(&tree.name), BlendTreeId(i as u32))
                .is_some()
            {
                return Err(BuildError::InvalidBlendTree {
                    tree: tree.name.clone(),
                    reason: "duplicate blend tree name",
                });
            }
        }
        Ok(Self {
            def,
            schema,
            clips,
            clip_index,
            tree_index,
        })
    }

    fn finish(self) -> Result<ControllerGraph, BuildError> {
        self.check_tree_cycles()?;
        let mut blend_trees = self
            .def
            .blend_trees
            .iter()
            .map(|t| self.blend_tree(t))
            .collect::<Result<Vec<_>, _>>()?;
        aggregate_parameters(&mut blend_trees);

        if self.def.layers.is_empty() {
            return Err(BuildError::EmptyStateMachine {
                layer: format!("{} (no layers)", self.def.name),
            });
        }
        let layers = self
            .def
            .layers
            .iter()
            .enumerate()
            .map(|(i, l)| self.layer(i, l))
            .collect::<Result<Vec<_>, _>>()?;

        let parameter_curves = self
            .clips
            .iter()
            .map(|clip| {
                clip.parameters
                    .iter()
                    .map(|c| {
                        self.schema
                            .index_of(name_hash(&c.name))
                            .filter(|i| self.schema.spec(*i).is_some_and(|s| s.curve_controlled))
                    })
                    .collect()
            })
            .collect();
        let humanoid = self.clips.iter().any(AnimationClip::is_humanoid);

        Ok(ControllerGraph {
            name: self.def.name.clone(),
            schema: Arc::new(self.schema),
            layers,
            clips: self.clips,
            clip_index: self.clip_index,
            blend_trees,
            parameter_curves,
            humanoid,
        })
    }

    fn parameter(
        &self,
        name: &str,
        context: impl FnOnce() -> String,
        accepts: &[ParameterType],
        expected: &'static str,
    ) -> Result<usize, BuildError> {
        let found = self
            .schema
            .index_of(name_hash(name))
            .and_then(|i| self.schema.spec(i).map(|s| (i, s.ty)));
        match found {
            Some((idx, ty)) if accepts.contains(&ty) => Ok(idx),
            Some((_, actual)) => Err(BuildError::ParameterTypeMismatch {
                context: context(),
                parameter: name.to_string(),
                expected,
                actual,
            }),
            None => Err(BuildError::UnknownParameter {
                context: context(),
                parameter: name.to_string(),
            }),
        }
    }

    fn motion(&self, def: &MotionDef, context: &dyn Fn() -> String) -> Result<Motion, BuildError> {
        match def {
            MotionDef::Clip(name) => self
                .clip_index
                .get(&name_hash(name))
                .map(|id| Motion::Clip(*id))
                .ok_or_else(|| BuildError::MissingClip {
                    context: context(),
                    clip: name.clone(),
                }),
            MotionDef::BlendTree(name) => self
                .tree_index
                .get(&name_hash(name))
                .map(|id| Motion::BlendTree(*id))
                .ok_or_else(|| BuildError::InvalidBlendTree {
                    tree: name.clone(),
                    reason: "referenced blend tree does not exist",
                }),
        }
    }

    fn check_tree_cycles(&self) -> Result<(), BuildError> {
        // 0 unvisited, 1 on stack, 2 done
        let trees = &self.def.blend_trees;
        let mut mark = vec![0u8; trees.len()];
        fn visit(b: &Builder, i: usize, mark: &mut [u8]) -> Result<(), BuildError> {
            match mark[i] {
                1 => {
                    return Err(BuildError::InvalidBlendTree {
                        tree: b.def.blend_trees[i].name.clone(),
                        reason: "blend trees nest cyclically",
                    })
                }
                2 => return Ok(()),
                _ => {}
            }
            mark[i] = 1;
            for child in &b.def.blend_trees[i].children {
                if let MotionDef::BlendTree(name) = &child.motion {
                    if let Some(id) = b.tree_index.get(&name_hash(name)) {
                        visit(b, id.0 as usize, mark)?;
                    }
                }
            }
            mark[i] = 2;
            Ok(())
        }
        for i in 0..trees.len() {
            visit(self, i, &mut mark)?;
        }
        Ok(())
    }

    fn blend_tree(&self, def: &BlendTreeDef) -> Result<BlendTree, BuildError> {
        let numeric = [ParameterType::Float, ParameterType::Int];
        let ctx = || format!("blend tree '{}'", def.name);
        if def.parameter.is_empty() {
            return Err(BuildError::InvalidBlendTree {
                tree: def.name.clone(),
                reason: "missing blend parameter",
            });
        }
        let param_x = self.parameter(&def.parameter, ctx, &numeric, "Float or Int")?;
        let param_y = if def.blend_type.is_2d() {
            match def.parameter_y.as_deref() {
                Some(name) if !name.is_empty() => {
                    Some(self.parameter(name, ctx, &numeric, "Float or Int")?)
                }
                _ => {
                    return Err(BuildError::InvalidBlendTree {
                        tree: def.name.clone(),
                        reason: "2D blend tree needs a second parameter",
                    })
                }
            }
        } else {
            None
        };

        let resolved;
        let thresholds = match def.cached_thresholds() {
            Some(cached) => cached,
            None => {
                resolved = def.resolve_thresholds();
                &resolved[..]
            }
        };
        let mut children = def
            .children
            .iter()
            .zip(thresholds.iter().copied())
            .map(|(c, threshold)| {
                Ok(BlendChild {
                    motion: self.motion(&c.motion, &ctx)?,
                    threshold,
                    position: c.position,
                    time_scale: c.time_scale,
                    cycle_offset: c.cycle_offset,
                    mirror: c.mirror,
                })
            })
            .collect::<Result<Vec<_>, BuildError>>()?;
        if def.blend_type == BlendType::Simple1D {
            children.sort_by(|a, b| a.threshold.total_cmp(&b.threshold));
        }

        let mut referenced = vec![param_x];
        referenced.extend(param_y);
        Ok(BlendTree::new(
            def.name.clone(),
            def.blend_type,
            param_x,
            param_y,
            children,
            referenced,
        ))
    }

    fn layer(&self, index: usize, def: &LayerDef) -> Result<Layer, BuildError> {
        let source = match def.synced_layer {
            Some(r) => self.synced_source(index, def, r)?,
            None => LayerSource::Machine(self.state_machine(def)?),
        };
        let mask = def.mask.clone().map(AvatarMask::compiled);
        Ok(Layer {
            name: def.name.clone(),
            name_hash: name_hash(&def.name),
            weight: if index == 0 { 1.0 } else { def.weight.clamp(0.0, 1.0) },
            blending: def.blending,
            mask,
            ik_pass: def.ik_pass,
            source,
        })
    }

    fn synced_source(&self, index: usize, def: &LayerDef, reference: usize) -> Result<LayerSource, BuildError> {
        let err = |reason| BuildError::InvalidSyncedLayer {
            layer: def.name.clone(),
            reason,
        };
        if reference == index {
            return Err(err("references itself"));
        }
        let Some(target) = self.def.layers.get(reference) else {
            return Err(err("references a missing layer"));
        };
        if target.synced_layer.is_some() {
            return Err(err("references another synced layer"));
        }
        let states = target.state_machine.states.len();
        if def.synced_motions.len() > states {
            return Err(err("has more motions than the reference layer has states"));
        }
        let mut motions = Vec::with_capacity(states);
        for (i, m) in def.synced_motions.iter().enumerate() {
            let ctx = || format!("synced layer '{}' state {i}", def.name);
            motions.push(match m {
                Some(m) => Some(self.motion(m, &ctx)?),
                None => None,
            });
        }
        motions.resize(states, None);
        Ok(LayerSource::Synced {
            layer: reference,
            affects_timing: def.synced_affects_timing,
            motions,
        })
    }

    fn state_machine(&self, layer: &LayerDef) -> Result<StateMachine, BuildError> {
        let def = &layer.state_machine;
        if def.states.is_empty() {
            return Err(BuildError::EmptyStateMachine {
                layer: layer.name.clone(),
            });
        }
        let mut by_name: FastMap<NameHash, usize> = FastMap::default();
        for (i, s) in def.states.iter().enumerate() {
            by_name.entry(name_hash(&s.name)).or_insert(i);
        }
        let default_state = match &def.default_state {
            Some(name) => *by_name.get(&name_hash(name)).ok_or_else(|| {
                BuildError::MissingDefaultState {
                    layer: layer.name.clone(),
                    state: name.clone(),
                }
            })?,
            None => 0,
        };

        let mut states = Vec::with_capacity(def.states.len());
        for s in &def.states {
            let ctx = || format!("layer '{}' state '{}'", layer.name, s.name);
            let motion = match &s.motion {
                Some(m) => Some(self.motion(m, &ctx)?),
                None => None,
            };
            let speed_parameter = match &s.speed_parameter {
                Some(p) => Some(self.parameter(p, ctx, &[ParameterType::Float], "Float")?),
                None => None,
            };
            let transitions = s
                .transitions
                .iter()
                .map(|t| self.transition(t, &s.name, &by_name, &ctx))
                .collect::<Result<Vec<_>, _>>()?;
            states.push(State {
                name: s.name.clone(),
                name_hash: name_hash(&s.name),
                path_hash: name_hash(&format!("{}.{}", layer.name, s.name)),
                tag_hash: name_hash(&s.tag),
                motion,
                speed: s.speed,
                speed_parameter,
                mirror: s.mirror,
                foot_ik: s.foot_ik,
                cycle_offset: s.cycle_offset,
                transitions,
            });
        }
        let any_ctx = || format!("layer '{}' any state", layer.name);
        let any_state = def
            .any_state
            .iter()
            .map(|t| self.transition(t, "AnyState", &by_name, &any_ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StateMachine {
            states,
            any_state,
            default_state,
        })
    }

    fn transition(
        &self,
        def: &TransitionDef,
        source: &str,
        states: &FastMap<NameHash, usize>,
        context: &dyn Fn() -> String,
    ) -> Result<Transition, BuildError> {
        let destination = *states
            .get(&name_hash(&def.destination))
            .ok_or_else(|| BuildError::DanglingDestination {
                context: context(),
                destination: def.destination.clone(),
            })?;
        let conditions = def
            .conditions
            .iter()
            .map(|c| self.condition(c, context))
            .collect::<Result<Vec<_>, _>>()?;
        let name = def
            .name
            .clone()
            .unwrap_or_else(|| format!("{source} -> {}", def.destination));
        Ok(Transition {
            name_hash: name_hash(&name),
            destination,
            conditions,
            duration: def.duration,
            duration_mode: def.duration_mode,
            offset: def.offset,
            atomic: def.atomic,
            solo: def.solo,
            mute: def.mute,
            can_transition_to_self: def.can_transition_to_self,
        })
    }

    fn condition(&self, def: &ConditionDef, context: &dyn Fn() -> String) -> Result<Condition, BuildError> {
        use ConditionMode::*;
        let (accepts, expected): (&[ParameterType], &'static str) = match def.mode {
            ExitTime => {
                return Ok(Condition {
                    mode: ExitTime,
                    parameter: None,
                    threshold: def.threshold,
                })
            }
            If | IfNot => (&[ParameterType::Bool, ParameterType::Trigger], "Bool or Trigger"),
            Greater | Less => (&[ParameterType::Float, ParameterType::Int], "Float or Int"),
            Equals | NotEqual => (&[ParameterType::Int], "Int"),
        };
        let idx = self.parameter(&def.parameter, context, accepts, expected)?;
        Ok(Condition {
            mode: def.mode,
            parameter: Some(idx),
            threshold: def.threshold,
        })
    }
}

/// Fold nested trees' parameters into each parent. Trees are acyclic.
fn aggregate_parameters(trees: &mut [BlendTree]) {
    fn collect(trees: &[BlendTree], i: usize, out: &mut Vec<usize>) {
        for p in &trees[i].referenced_parameters {
            if !out.contains(p) {
                out.push(*p);
            }
        }
        for child in trees[i].children() {
            if let Motion::BlendTree(id) = child.motion {
                collect(trees, id.0 as usize, out);
            }
        }
    }
    let all: Vec<Vec<usize>> = (0..trees.len())
        .map(|i| {
            let mut out = Vec::new();
            collect(trees, i, &mut out);
            out
        })
        .collect();
    for (tree, params) in trees.iter_mut().zip(all) {
        tree.referenced_parameters = params;
    }
}
