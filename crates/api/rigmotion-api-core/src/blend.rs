//! Blending utilities for Value types.
//! - linear interpolation for floats
//! - step blending for Int/Bool/ObjectRef (choose left or right by t < 0.5)
//! - additive application of a (value - reference) delta on top of a base

use crate::Value;

#[inline]
fn lerp_f(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Blend two Values according to their kinds.
/// Step kinds (Int/Bool/ObjectRef) and mixed kinds pick a for t < 0.5, else b.
pub fn blend_values(a: &Value, b: &Value, t: f32) -> Value {
    match (a, b) {
        (Value::Float(af), Value::Float(bf)) => Value::Float(lerp_f(*af, *bf, t)),
        _ => step_blend(a, b, t),
    }
}

/// Step blending for step-only types: choose a for t < 0.5, else b.
pub fn step_blend(a: &Value, b: &Value, t: f32) -> Value {
    if t < 0.5 {
        a.clone()
    } else {
        b.clone()
    }
}

/// Additive blend: `base + (value - reference) * w`.
/// Step kinds take `value` once w >= 0.5.
pub fn add_values(base: &Value, value: &Value, reference: &Value, w: f32) -> Value {
    match (base, value, reference) {
        (Value::Float(b), Value::Float(v), Value::Float(r)) => Value::Float(b + (v - r) * w),
        _ => step_blend(base, value, w),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn blend_floats() {
        let r = blend_values(&Value::Float(0.0), &Value::Float(1.0), 0.5);
        assert_eq!(r, Value::Float(0.5));
    }

    #[test]
    fn step_kinds_switch_at_half() {
        let a = Value::object(1);
        let b = Value::ObjectRef(None);
        assert_eq!(blend_values(&a, &b, 0.25), a);
        assert_eq!(blend_values(&a, &b, 0.75), b);
        assert_eq!(step_blend(&Value::Bool(false), &Value::Bool(true), 0.5), Value::Bool(true));
    }

    #[test]
    fn mixed_kinds_step() {
        assert_eq!(blend_values(&Value::Float(3.0), &Value::Int(1), 0.25), Value::Float(3.0));
        assert_eq!(blend_values(&Value::Float(3.0), &Value::Int(1), 0.75), Value::Int(1));
    }

    #[test]
    fn additive_float() {
        let r = add_values(&Value::Float(1.0), &Value::Float(3.0), &Value::Float(1.0), 0.5);
        assert_eq!(r, Value::Float(2.0));
    }

    #[test]
    fn additive_step_takes_value_past_half() {
        let base = Value::Bool(false);
        let on = Value::Bool(true);
        let reference = Value::neutral_of(on.kind());
        assert_eq!(add_values(&base, &on, &reference, 0.4), base);
        assert_eq!(add_values(&base, &on, &reference, 0.6), on);
    }
}
