//! Property writes produced by the animation engine for generic (non-skeletal)
//! properties. One batch is collected per instance per tick and merged by the host.
//!
//! PropertyWrite serializes to JSON as:
//!   { "path": "Body#Renderer.enabled", "value": { "type": "Bool", "data": true } }

use crate::{PropertyPath, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyWrite {
    pub path: PropertyPath,
    pub value: Value,
}

impl PropertyWrite {
    pub fn new(path: PropertyPath, value: Value) -> Self {
        Self { path, value }
    }
}

impl fmt::Display for PropertyWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let val = serde_json::to_string(&self.value).map_err(|_| fmt::Error)?;
        write!(f, "{{ path: {}, value: {} }}", self.path, val)
    }
}

/// A batch of property writes in emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch(pub Vec<PropertyWrite>);

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch(Vec::new())
    }

    pub fn push(&mut self, op: PropertyWrite) {
        self.0.push(op);
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = PropertyWrite>) {
        self.0.extend(other);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyWrite> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Empty the batch but keep its allocation for the next tick.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn append(&mut self, other: &mut WriteBatch) {
        self.0.append(&mut other.0)
    }

    pub fn into_vec(self) -> Vec<PropertyWrite> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_json_shape() {
        let op = PropertyWrite::new(
            PropertyPath::parse("Body#Renderer.enabled").unwrap(),
            Value::Bool(true),
        );
        let s = serde_json::to_string(&op).unwrap();
        assert_eq!(
            s,
            r#"{"path":"Body#Renderer.enabled","value":{"type":"Bool","data":true}}"#
        );
    }

    #[test]
    fn append_drains_other() {
        let mut a = WriteBatch::new();
        let mut b = WriteBatch::new();
        b.push(PropertyWrite::new(
            PropertyPath::parse("#Light.intensity").unwrap(),
            Value::Float(0.5),
        ));
        a.append(&mut b);
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }
}
