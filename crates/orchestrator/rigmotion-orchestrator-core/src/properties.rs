use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use rigmotion_animation_core::InstId;
use rigmotion_api_core::{PropertyPath, Value, WriteBatch};

/// Last written value of one generic property, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub value: Value,
    pub epoch: u64,
    pub source: InstId,
}

/// Recorded when two instances write the same property in one step.
/// The later write (in insertion order) wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictLog {
    pub path: PropertyPath,
    pub previous_value: Value,
    pub previous_source: InstId,
    pub new_value: Value,
    pub new_source: InstId,
    pub epoch: u64,
}

/// Generic property values merged from every instance, in first-write order.
#[derive(Debug, Default, Clone)]
pub struct PropertyStore {
    inner: IndexMap<PropertyPath, PropertyEntry>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &PropertyPath) -> Option<&PropertyEntry> {
        self.inner.get(path)
    }

    /// Parse `path` and look it up. Unparseable paths are absent.
    pub fn get_str(&self, path: &str) -> Option<&PropertyEntry> {
        PropertyPath::parse(path).ok().and_then(|p| self.inner.get(&p))
    }

    pub fn remove(&mut self, path: &PropertyPath) -> Option<PropertyEntry> {
        self.inner.shift_remove(path)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PropertyPath, &PropertyEntry)> {
        self.inner.iter()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Merge one instance's writes with last-writer-wins semantics. Writes that
    /// overwrite another instance's value from the same epoch are logged.
    pub fn apply_batch(&mut self, batch: WriteBatch, epoch: u64, source: InstId) -> Vec<ConflictLog> {
        let mut conflicts = Vec::new();
        for op in batch.into_vec() {
            let entry = PropertyEntry {
                value: op.value,
                epoch,
                source,
            };
            match self.inner.get_mut(&op.path) {
                Some(prev) => {
                    if prev.epoch == epoch && prev.source != source {
                        conflicts.push(ConflictLog {
                            path: op.path.clone(),
                            previous_value: prev.value.clone(),
                            previous_source: prev.source,
                            new_value: entry.value.clone(),
                            new_source: source,
                            epoch,
                        });
                    }
                    *prev = entry;
                }
                None => {
                    self.inner.insert(op.path, entry);
                }
            }
        }
        conflicts
    }
}
