//! Coercion helpers between Value shapes.
//! Used when a curve of one kind drives a property bound with another.

use crate::{ObjectId, Value};

/// Coerce a Value into a scalar f32.
/// - Float -> its value
/// - Int -> as f32
/// - Bool -> 1.0 / 0.0
/// - ObjectRef -> 0.0
pub fn to_float(v: &Value) -> f32 {
    match v {
        Value::Float(f) => *f,
        Value::Int(i) => *i as f32,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::ObjectRef(_) => 0.0,
    }
}

/// Bool view: non-zero numbers and non-empty references are true.
pub fn to_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::ObjectRef(r) => r.is_some(),
    }
}

/// Object-reference curves are stored as float keys holding the object id.
pub fn to_object_ref(v: &Value) -> Option<ObjectId> {
    match v {
        Value::ObjectRef(r) => *r,
        Value::Int(i) if *i >= 0 => Some(ObjectId(*i as u64)),
        Value::Float(f) if *f >= 0.0 && f.is_finite() => Some(ObjectId(f.round() as u64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_views() {
        assert_eq!(to_float(&Value::Bool(true)), 1.0);
        assert_eq!(to_float(&Value::Int(3)), 3.0);
        assert!(to_bool(&Value::Float(0.5)));
        assert!(!to_bool(&Value::ObjectRef(None)));
    }

    #[test]
    fn object_ref_from_float_key() {
        assert_eq!(to_object_ref(&Value::Float(4.0)), Some(ObjectId(4)));
        assert_eq!(to_object_ref(&Value::Float(-1.0)), None);
    }
}
