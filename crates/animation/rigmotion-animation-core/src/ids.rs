//! Identifiers, name hashes and simple allocators for core entities.

use std::hash::Hasher;

use fnv::{FnvBuildHasher, FnvHasher};
use serde::{Deserialize, Serialize};

/// Hash of a UTF-8 name. Computed once when a graph is built; every runtime
/// lookup goes through hashes or resolved indices, never strings.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameHash(pub u32);

impl NameHash {
    pub fn of(name: &str) -> Self {
        name_hash(name)
    }
}

impl From<&str> for NameHash {
    fn from(name: &str) -> Self {
        name_hash(name)
    }
}

/// FNV-1a over the name bytes, folded to 32 bits.
pub fn name_hash(name: &str) -> NameHash {
    let mut h = FnvHasher::default();
    h.write(name.as_bytes());
    let wide = h.finish();
    NameHash((wide ^ (wide >> 32)) as u32)
}

/// Map keyed by hashes or small ids; FNV is plenty for pre-hashed keys.
pub type FastMap<K, V> = hashbrown::HashMap<K, V, FnvBuildHasher>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct InstId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ClipId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlendTreeId(pub u32);

/// Monotonic allocator for instance ids.
/// Dense indices improve cache locality; IDs are opaque externally.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_inst: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_inst(&mut self) -> InstId {
        let id = InstId(self.next_inst);
        self.next_inst = self.next_inst.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_inst(), InstId(0));
        assert_eq!(alloc.alloc_inst(), InstId(1));
        alloc.reset();
        assert_eq!(alloc.alloc_inst(), InstId(0));
    }

    #[test]
    fn hashes_are_stable_and_distinct() {
        assert_eq!(name_hash("Speed"), name_hash("Speed"));
        assert_ne!(name_hash("Speed"), name_hash("speed"));
        assert_eq!(NameHash::from("Base.Idle"), name_hash("Base.Idle"));
        // the empty name is a valid key
        let _ = name_hash("");
    }
}
