//! Avatar masks restrict which body parts and transform paths a layer affects.

use serde::{Deserialize, Serialize};

use crate::human::{AvatarGoal, HumanBone};
use crate::ids::{name_hash, NameHash};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyPart {
    Root,
    Body,
    Head,
    LeftLeg,
    RightLeg,
    LeftArm,
    RightArm,
    LeftFingers,
    RightFingers,
    LeftFootIk,
    RightFootIk,
    LeftHandIk,
    RightHandIk,
}

pub const BODY_PART_COUNT: usize = 13;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvatarMask {
    /// Body parts switched off; everything else is active.
    #[serde(default)]
    pub disabled: Vec<BodyPart>,
    /// When set, only these generic transform paths are affected.
    #[serde(default)]
    pub transforms: Option<Vec<String>>,
    #[serde(skip)]
    parts: [bool; BODY_PART_COUNT],
    #[serde(skip)]
    paths: Option<Vec<NameHash>>,
}

impl Default for AvatarMask {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            transforms: None,
            parts: [true; BODY_PART_COUNT],
            paths: None,
        }
    }
}

impl AvatarMask {
    pub fn disabling(parts: &[BodyPart]) -> Self {
        let mut m = Self {
            disabled: parts.to_vec(),
            ..Self::default()
        };
        m.compile();
        m
    }

    /// Build the lookup tables from the serialized fields. Deserialized masks
    /// block everything until compiled.
    pub fn compile(&mut self) {
        self.parts = [true; BODY_PART_COUNT];
        for p in &self.disabled {
            self.parts[*p as usize] = false;
        }
        self.paths = self
            .transforms
            .as_ref()
            .map(|ts| ts.iter().map(|t| name_hash(t)).collect());
    }

    pub fn compiled(mut self) -> Self {
        self.compile();
        self
    }

    #[inline]
    pub fn allows(&self, part: BodyPart) -> bool {
        self.parts[part as usize]
    }

    #[inline]
    pub fn allows_bone(&self, bone: HumanBone) -> bool {
        self.allows(bone.body_part())
    }

    #[inline]
    pub fn allows_goal(&self, goal: AvatarGoal) -> bool {
        self.allows(goal.body_part())
    }

    pub fn allows_path(&self, path: NameHash) -> bool {
        match &self.paths {
            Some(list) => list.contains(&path),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_parts_block_their_bones() {
        let m = AvatarMask::disabling(&[BodyPart::LeftArm, BodyPart::LeftHandIk]);
        assert!(!m.allows_bone(HumanBone::LeftLowerArm));
        assert!(m.allows_bone(HumanBone::RightLowerArm));
        assert!(!m.allows_goal(AvatarGoal::LeftHand));
        assert!(m.allows(BodyPart::Root));
    }

    #[test]
    fn json_mask_compiles_paths() {
        let m: AvatarMask =
            serde_json::from_str(r#"{ "disabled": ["Root"], "transforms": ["Hips/Tail"] }"#).unwrap();
        let m = m.compiled();
        assert!(!m.allows(BodyPart::Root));
        assert!(m.allows_path(name_hash("Hips/Tail")));
        assert!(!m.allows_path(name_hash("Hips/Spine")));
    }
}
