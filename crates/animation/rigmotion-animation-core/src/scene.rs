//! Transforms and the destination transform hierarchy an instance writes into.
//!
//! Node 0 is the animated root and has the empty path; every other node names
//! a parent that precedes it, and its path is the `/`-joined chain of names
//! below the root (e.g. `Hips/Spine/Chest`).
//!
//! A rig in `Optimized` mode has no hierarchy for hosts to walk: the engine
//! writes flattened global transforms that the host copies out as-is.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::ids::{name_hash, FastMap, NameHash};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_translation_rotation(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Parent-to-child composition: `self` is the parent frame.
    #[inline]
    pub fn mul_transform(&self, child: &Transform) -> Transform {
        Transform {
            translation: self.transform_point(child.translation),
            rotation: (self.rotation * child.rotation).normalize(),
            scale: self.scale * child.scale,
        }
    }

    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.translation + self.rotation * (self.scale * p)
    }

    /// Inverse for rigid transforms with non-zero scale.
    pub fn inverse(&self) -> Transform {
        let inv_scale = Vec3::new(
            safe_recip(self.scale.x),
            safe_recip(self.scale.y),
            safe_recip(self.scale.z),
        );
        let inv_rot = self.rotation.inverse();
        Transform {
            translation: inv_scale * (inv_rot * -self.translation),
            rotation: inv_rot,
            scale: inv_scale,
        }
    }
}

#[inline]
fn safe_recip(v: f32) -> f32 {
    if v.abs() <= f32::EPSILON {
        0.0
    } else {
        1.0 / v
    }
}

/// Authoring description of one skeleton node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkeletonNodeDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub local: Transform,
}

impl SkeletonNodeDef {
    pub fn new(name: impl Into<String>, parent: Option<usize>, local: Transform) -> Self {
        Self {
            name: name.into(),
            parent,
            local,
        }
    }
}

/// Validate parent links and compute the `/`-joined path of every node.
pub(crate) fn node_paths(nodes: &[SkeletonNodeDef]) -> Result<Vec<String>, BuildError> {
    let mut paths: Vec<String> = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        let path = match (i, node.parent) {
            (0, None) => String::new(),
            (_, Some(p)) if p < i => {
                let parent = &paths[p];
                if parent.is_empty() {
                    node.name.clone()
                } else {
                    format!("{parent}/{}", node.name)
                }
            }
            (_, parent) => {
                return Err(BuildError::InvalidParent {
                    node: node.name.clone(),
                    parent: parent.unwrap_or(usize::MAX),
                })
            }
        };
        paths.push(path);
    }
    Ok(paths)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RigMode {
    #[default]
    Hierarchy,
    Optimized,
}

#[derive(Clone, Debug)]
pub struct RigNode {
    pub name: String,
    pub path: String,
    pub path_hash: NameHash,
    pub parent: Option<usize>,
    pub local: Transform,
}

/// Destination transform hierarchy owned by one animated instance.
#[derive(Clone, Debug)]
pub struct SceneRig {
    nodes: Vec<RigNode>,
    globals: Vec<Transform>,
    by_path: FastMap<NameHash, usize>,
    mode: RigMode,
}

impl SceneRig {
    pub fn new(defs: &[SkeletonNodeDef]) -> Result<Self, BuildError> {
        let paths = node_paths(defs)?;
        let mut by_path = FastMap::default();
        let nodes: Vec<RigNode> = defs
            .iter()
            .zip(paths)
            .enumerate()
            .map(|(i, (def, path))| {
                let path_hash = name_hash(&path);
                by_path.insert(path_hash, i);
                RigNode {
                    name: def.name.clone(),
                    path,
                    path_hash,
                    parent: def.parent,
                    local: def.local,
                }
            })
            .collect();
        let mut rig = Self {
            globals: vec![Transform::IDENTITY; nodes.len()],
            nodes,
            by_path,
            mode: RigMode::Hierarchy,
        };
        rig.update_globals();
        Ok(rig)
    }

    /// Switch to flattened output; hosts read `globals()` only.
    pub fn optimized(mut self) -> Self {
        self.mode = RigMode::Optimized;
        self
    }

    #[inline]
    pub fn mode(&self) -> RigMode {
        self.mode
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, path: &str) -> Option<usize> {
        self.find_hash(name_hash(path))
    }

    #[inline]
    pub fn find_hash(&self, path: NameHash) -> Option<usize> {
        self.by_path.get(&path).copied()
    }

    pub fn node(&self, i: usize) -> Option<&RigNode> {
        self.nodes.get(i)
    }

    pub fn nodes(&self) -> &[RigNode] {
        &self.nodes
    }

    pub fn local(&self, i: usize) -> Option<Transform> {
        self.nodes.get(i).map(|n| n.local)
    }

    pub fn set_local(&mut self, i: usize, t: Transform) {
        if let Some(n) = self.nodes.get_mut(i) {
            n.local = t;
        }
    }

    pub fn global(&self, i: usize) -> Option<Transform> {
        self.globals.get(i).copied()
    }

    pub fn globals(&self) -> &[Transform] {
        &self.globals
    }

    /// Direct write of a flattened global (optimized rigs).
    pub fn set_global(&mut self, i: usize, t: Transform) {
        if let Some(g) = self.globals.get_mut(i) {
            *g = t;
        }
    }

    /// Recompute globals from locals. Parents precede children.
    pub fn update_globals(&mut self) {
        for i in 0..self.nodes.len() {
            let local = self.nodes[i].local;
            self.globals[i] = match self.nodes[i].parent {
                Some(p) => self.globals[p].mul_transform(&local),
                None => local,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Vec<SkeletonNodeDef> {
        vec![
            SkeletonNodeDef::new("Root", None, Transform::IDENTITY),
            SkeletonNodeDef::new("Hips", Some(0), Transform::from_translation(Vec3::Y)),
            SkeletonNodeDef::new(
                "Spine",
                Some(1),
                Transform::from_translation_rotation(
                    Vec3::new(0.0, 0.5, 0.0),
                    Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
                ),
            ),
            SkeletonNodeDef::new("Tip", Some(2), Transform::from_translation(Vec3::X)),
        ]
    }

    #[test]
    fn paths_and_globals() {
        let rig = SceneRig::new(&chain()).unwrap();
        assert_eq!(rig.find("Hips/Spine"), Some(2));
        assert_eq!(rig.find(""), Some(0));
        let tip = rig.global(3).unwrap().translation;
        assert!(tip.abs_diff_eq(Vec3::new(0.0, 2.5, 0.0), 1e-5));
    }

    #[test]
    fn inverse_undoes_transform() {
        let t = Transform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.7),
            scale: Vec3::splat(2.0),
        };
        let p = Vec3::new(-0.5, 0.25, 4.0);
        let back = t.inverse().transform_point(t.transform_point(p));
        assert!(back.abs_diff_eq(p, 1e-4));
    }

    #[test]
    fn forward_parent_is_rejected() {
        let mut defs = chain();
        defs[1].parent = Some(3);
        assert!(matches!(
            SceneRig::new(&defs),
            Err(BuildError::InvalidParent { .. })
        ));
    }
}
