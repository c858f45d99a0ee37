//! Value: runtime payload of a generic animated property.

use serde::{Deserialize, Serialize};

/// Opaque reference to a host object (material, sprite, mesh...).
/// The engine never dereferences it; hosts map it back to their own handles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// Coarse kind of a [`Value`], used for binding checks and dispatch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Float,
    Int,
    Bool,
    ObjectRef,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Value {
    /// Scalar float (blended linearly)
    Float(f32),

    /// Integer (step); produced when a host binds a float curve to an integer field
    Int(i32),

    /// Boolean such as an `enabled` flag (step)
    Bool(bool),

    /// Object reference; `None` clears the field (step)
    ObjectRef(Option<ObjectId>),
}

impl Value {
    /// Return the coarse kind of this value.
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Float(_) => ValueKind::Float,
            Value::Int(_) => ValueKind::Int,
            Value::Bool(_) => ValueKind::Bool,
            Value::ObjectRef(_) => ValueKind::ObjectRef,
        }
    }

    /// Step kinds are never interpolated; blending picks one side.
    #[inline]
    pub fn is_step(&self) -> bool {
        !matches!(self, Value::Float(_))
    }

    pub fn object(id: u64) -> Self {
        Value::ObjectRef(Some(ObjectId(id)))
    }

    /// Neutral value of the same kind, used as the reference for additive blending.
    pub fn neutral_of(kind: ValueKind) -> Value {
        match kind {
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Int => Value::Int(0),
            ValueKind::Bool => Value::Bool(false),
            ValueKind::ObjectRef => Value::ObjectRef(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_tagging_is_stable() {
        let v = Value::object(7);
        let s = serde_json::to_string(&v).unwrap();
        assert_eq!(s, r#"{"type":"ObjectRef","data":7}"#);
        let back: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn step_kinds() {
        assert!(Value::Bool(true).is_step());
        assert!(Value::Int(2).is_step());
        assert!(Value::ObjectRef(None).is_step());
        assert!(!Value::Float(1.0).is_step());
    }
}
