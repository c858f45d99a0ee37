//! Binding tables and the target resolver trait.
//!
//! An `AvatarBinding` is built once per (avatar, controller, rig) triple. It
//! maps human bones, generic bone curves and the root motion bone to rig node
//! indices, and generic property curves to handles issued by a
//! `TargetResolver`. Per-tick evaluation only follows these indices.

use rigmotion_api_core::{PropertyPath, ValueKind};

use crate::avatar::AvatarConstant;
use crate::clip::PropertyCurveKind;
use crate::controller::ControllerGraph;
use crate::error::BuildError;
use crate::human::{AvatarGoal, HumanBone, HUMAN_BONE_COUNT};
use crate::ids::NameHash;
use crate::retarget;
use crate::scene::{SceneRig, Transform};

/// Opaque handle for a resolved generic property, with the value kind the
/// host expects. Writes are coerced to this kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TargetHandle {
    pub id: u32,
    pub kind: ValueKind,
}

/// Resolves property paths to handles. Hosts implement this and pass it to
/// `Animator::bind`; unresolved paths are skipped silently.
pub trait TargetResolver {
    fn resolve(&mut self, path: &PropertyPath, hint: ValueKind) -> Option<TargetHandle>;
}

/// Default resolver: accepts any path whose node exists in the rig and keeps
/// the curve's own value kind.
pub struct RigResolver<'a> {
    rig: &'a SceneRig,
    next: u32,
}

impl<'a> RigResolver<'a> {
    pub fn new(rig: &'a SceneRig) -> Self {
        Self { rig, next: 0 }
    }
}

impl TargetResolver for RigResolver<'_> {
    fn resolve(&mut self, path: &PropertyPath, hint: ValueKind) -> Option<TargetHandle> {
        self.rig.find(&path.node_path())?;
        let id = self.next;
        self.next += 1;
        Some(TargetHandle { id, kind: hint })
    }
}

pub(crate) fn curve_value_kind(kind: PropertyCurveKind) -> ValueKind {
    match kind {
        PropertyCurveKind::Float => ValueKind::Float,
        PropertyCurveKind::Bool => ValueKind::Bool,
        PropertyCurveKind::ObjectRef => ValueKind::ObjectRef,
    }
}

/// One bound generic property; the slot index keys accumulation.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundProperty {
    pub handle: TargetHandle,
    pub path: PropertyPath,
}

#[derive(Clone, Debug)]
pub struct AvatarBinding {
    /// Rig node per human bone.
    pub human_nodes: [Option<usize>; HUMAN_BONE_COUNT],
    pub root_motion_node: Option<usize>,
    /// Per clip, per bone curve: rig node.
    pub bone_curves: Vec<Vec<Option<usize>>>,
    /// Per clip, per property curve: slot in `properties`.
    pub property_curves: Vec<Vec<Option<usize>>>,
    pub properties: Vec<BoundProperty>,
    /// Parent index per rig node; parents precede children.
    pub parents: Vec<Option<usize>>,
    /// Path hash per rig node, for transform masks.
    pub paths: Vec<NameHash>,
    /// Bind-pose locals per rig node (avatar bind where mapped).
    pub bind_locals: Vec<Transform>,
    pub bind_globals: Vec<Transform>,
    /// Lateral side (+1 / -1) of the left and right foot relative to the hips.
    pub foot_side: [f32; 2],
}

impl AvatarBinding {
    pub fn build(
        avatar: &AvatarConstant,
        graph: &ControllerGraph,
        rig: &SceneRig,
        resolver: &mut dyn TargetResolver,
    ) -> Result<Self, BuildError> {
        if graph.uses_humanoid_clips() && !avatar.is_humanoid() {
            return Err(BuildError::NotHumanoid {
                avatar: avatar.name.clone(),
            });
        }

        let avatar_to_rig: Vec<Option<usize>> = avatar
            .nodes
            .iter()
            .map(|n| rig.find_hash(n.path_hash))
            .collect();

        let mut human_nodes = [None; HUMAN_BONE_COUNT];
        if let Some(human) = &avatar.human {
            if let Some(bone) = human.first_missing_required() {
                return Err(BuildError::MissingHumanBone { bone });
            }
            for bone in HumanBone::all() {
                let node = human.node(bone).and_then(|n| avatar_to_rig[n]);
                if node.is_none() && bone.is_required() {
                    return Err(BuildError::MissingHumanBone { bone });
                }
                human_nodes[bone.index()] = node;
            }
        }

        let mut bind_locals: Vec<Transform> = rig.nodes().iter().map(|n| n.local).collect();
        for (a, r) in avatar_to_rig.iter().enumerate() {
            if let Some(r) = r {
                bind_locals[*r] = avatar.nodes[a].bind;
            }
        }

        let parents: Vec<Option<usize>> = rig.nodes().iter().map(|n| n.parent).collect();
        let paths = rig.nodes().iter().map(|n| n.path_hash).collect();
        let mut bind_globals = vec![Transform::IDENTITY; bind_locals.len()];
        retarget::forward(&parents, &bind_locals, &mut bind_globals);

        let root_motion_node = avatar.root_motion_node.and_then(|n| avatar_to_rig[n]);

        let bone_curves = graph
            .clips()
            .iter()
            .map(|clip| clip.bones.iter().map(|b| rig.find(&b.path)).collect())
            .collect();

        let mut properties: Vec<BoundProperty> = Vec::new();
        let mut property_curves = Vec::with_capacity(graph.clips().len());
        for clip in graph.clips() {
            let mut slots = Vec::with_capacity(clip.properties.len());
            for curve in &clip.properties {
                let slot = match properties.iter().position(|p| p.path == curve.path) {
                    Some(i) => Some(i),
                    None => resolver
                        .resolve(&curve.path, curve_value_kind(curve.kind))
                        .map(|handle| {
                            properties.push(BoundProperty {
                                handle,
                                path: curve.path.clone(),
                            });
                            properties.len() - 1
                        }),
                };
                slots.push(slot);
            }
            property_curves.push(slots);
        }

        let foot_side = foot_sides(&human_nodes, &bind_globals);

        log::debug!(
            "bound avatar '{}' to controller '{}': {} human bones, {} properties, root motion node {:?}",
            avatar.name,
            graph.name(),
            human_nodes.iter().flatten().count(),
            properties.len(),
            root_motion_node
        );

        Ok(Self {
            human_nodes,
            root_motion_node,
            bone_curves,
            property_curves,
            properties,
            parents,
            paths,
            bind_locals,
            bind_globals,
            foot_side,
        })
    }

    #[inline]
    pub fn node(&self, bone: HumanBone) -> Option<usize> {
        self.human_nodes[bone.index()]
    }

    /// Upper, lower and end nodes of a goal's limb.
    pub fn chain(&self, goal: AvatarGoal) -> Option<[usize; 3]> {
        let [a, b, c] = goal.chain();
        Some([self.node(a)?, self.node(b)?, self.node(c)?])
    }
}

fn foot_sides(human_nodes: &[Option<usize>; HUMAN_BONE_COUNT], bind_globals: &[Transform]) -> [f32; 2] {
    let mut sides = [1.0, -1.0];
    let x = |bone: HumanBone| human_nodes[bone.index()].map(|n| bind_globals[n].translation.x);
    if let Some(hips) = x(HumanBone::Hips) {
        for (side, foot) in sides
            .iter_mut()
            .zip([HumanBone::LeftFoot, HumanBone::RightFoot])
        {
            if let Some(fx) = x(foot) {
                if fx != hips {
                    *side = (fx - hips).signum();
                }
            }
        }
    }
    sides
}
