//! Avatar constant: skeleton, optional humanoid description and root motion bone.
//!
//! `AvatarConstant::build` only validates the skeleton itself. Required human
//! bones are checked when an instance binds, so a broken avatar refuses to
//! activate the instance rather than failing at asset load.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::human::{HumanBone, MuscleLimit, HUMAN_BONE_COUNT, REQUIRED_BONES};
use crate::ids::{name_hash, NameHash};
use crate::scene::{node_paths, SkeletonNodeDef, Transform};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HumanBoneMapping {
    pub bone: HumanBone,
    /// Skeleton node name.
    pub node: String,
    #[serde(default)]
    pub limit: Option<MuscleLimit>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanDescription {
    pub bones: Vec<HumanBoneMapping>,
    /// Share of upper-arm twist kept by the upper arm; the rest goes to the forearm.
    pub upper_arm_twist: f32,
    pub lower_arm_twist: f32,
    pub upper_leg_twist: f32,
    pub lower_leg_twist: f32,
    /// Allowed IK extension of an arm, as a fraction of its length.
    pub arm_stretch: f32,
    pub leg_stretch: f32,
    /// Lateral offset applied to animated foot goals.
    pub feet_spacing: f32,
}

impl Default for HumanDescription {
    fn default() -> Self {
        Self {
            bones: Vec::new(),
            upper_arm_twist: 0.5,
            lower_arm_twist: 0.5,
            upper_leg_twist: 0.5,
            lower_leg_twist: 0.5,
            arm_stretch: 0.05,
            leg_stretch: 0.05,
            feet_spacing: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvatarDef {
    pub name: String,
    pub skeleton: Vec<SkeletonNodeDef>,
    #[serde(default)]
    pub human: Option<HumanDescription>,
    /// Node path (e.g. `Hips`) whose motion becomes root motion on generic rigs.
    #[serde(default)]
    pub root_motion_bone: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AvatarNode {
    pub name: String,
    pub path: String,
    pub path_hash: NameHash,
    pub parent: Option<usize>,
    pub bind: Transform,
}

/// Humanoid data resolved against the skeleton.
#[derive(Clone, Debug)]
pub struct HumanConstant {
    pub bone_to_node: [Option<usize>; HUMAN_BONE_COUNT],
    pub limits: [MuscleLimit; HUMAN_BONE_COUNT],
    pub description: HumanDescription,
}

impl HumanConstant {
    #[inline]
    pub fn node(&self, bone: HumanBone) -> Option<usize> {
        self.bone_to_node[bone.index()]
    }

    /// Share of twist kept by `bone` (the rest passes to its twist child).
    pub fn twist_share(&self, bone: HumanBone) -> f32 {
        use HumanBone::*;
        let d = &self.description;
        match bone {
            LeftUpperArm | RightUpperArm => d.upper_arm_twist,
            LeftLowerArm | RightLowerArm => d.lower_arm_twist,
            LeftUpperLeg | RightUpperLeg => d.upper_leg_twist,
            LeftLowerLeg | RightLowerLeg => d.lower_leg_twist,
            _ => 1.0,
        }
        .clamp(0.0, 1.0)
    }

    pub fn first_missing_required(&self) -> Option<HumanBone> {
        REQUIRED_BONES
            .iter()
            .copied()
            .find(|b| self.bone_to_node[b.index()].is_none())
    }
}

#[derive(Clone, Debug)]
pub struct AvatarConstant {
    pub name: String,
    pub nodes: Vec<AvatarNode>,
    pub human: Option<HumanConstant>,
    pub root_motion_node: Option<usize>,
}

impl AvatarConstant {
    pub fn build(def: &AvatarDef) -> Result<Arc<Self>, BuildError> {
        let paths = node_paths(&def.skeleton)?;
        let nodes: Vec<AvatarNode> = def
            .skeleton
            .iter()
            .zip(paths)
            .map(|(n, path)| AvatarNode {
                name: n.name.clone(),
                path_hash: name_hash(&path),
                path,
                parent: n.parent,
                bind: n.local,
            })
            .collect();

        let human = match &def.human {
            Some(desc) => {
                let mut bone_to_node = [None; HUMAN_BONE_COUNT];
                let mut limits = [MuscleLimit::symmetric(0.0, 0.0, 0.0); HUMAN_BONE_COUNT];
                for bone in HumanBone::all() {
                    limits[bone.index()] = MuscleLimit::default_for(bone);
                }
                for m in &desc.bones {
                    let idx = nodes.iter().position(|n| n.name == m.node).ok_or_else(|| {
                        BuildError::UnknownSkeletonNode {
                            bone: m.bone,
                            node: m.node.clone(),
                        }
                    })?;
                    bone_to_node[m.bone.index()] = Some(idx);
                    if let Some(limit) = m.limit {
                        limits[m.bone.index()] = limit;
                    }
                }
                Some(HumanConstant {
                    bone_to_node,
                    limits,
                    description: desc.clone(),
                })
            }
            None => None,
        };

        let root_motion_node = def
            .root_motion_bone
            .as_ref()
            .and_then(|p| nodes.iter().position(|n| n.path == *p));
        if def.root_motion_bone.is_some() && root_motion_node.is_none() {
            log::warn!(
                "avatar '{}': root motion bone {:?} not found in skeleton",
                def.name,
                def.root_motion_bone
            );
        }

        Ok(Arc::new(Self {
            name: def.name.clone(),
            nodes,
            human,
            root_motion_node,
        }))
    }

    #[inline]
    pub fn is_humanoid(&self) -> bool {
        self.human.is_some()
    }

    pub fn find_path(&self, path: NameHash) -> Option<usize> {
        self.nodes.iter().position(|n| n.path_hash == path)
    }

    pub fn bind_pose(&self) -> impl Iterator<Item = Transform> + '_ {
        self.nodes.iter().map(|n| n.bind)
    }

    /// Bind-pose globals, parents first.
    pub fn bind_globals(&self) -> Vec<Transform> {
        let mut out: Vec<Transform> = Vec::with_capacity(self.nodes.len());
        for n in &self.nodes {
            let g = match n.parent {
                Some(p) => out[p].mul_transform(&n.bind),
                None => n.bind,
            };
            out.push(g);
        }
        out
    }
}
