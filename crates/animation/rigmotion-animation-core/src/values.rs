//! Value store: parameter schema shared by every instance of a controller graph,
//! plus the per-instance flat value array.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, ValueError};
use crate::ids::{name_hash, FastMap, NameHash};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterType {
    Float,
    Int,
    Bool,
    /// Boolean that the state machine resets once a transition consumed it.
    Trigger,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f32),
    Int(i32),
    Bool(bool),
}

impl ParameterValue {
    /// Numeric view used by threshold conditions.
    pub fn as_f32(self) -> f32 {
        match self {
            ParameterValue::Float(v) => v,
            ParameterValue::Int(v) => v as f32,
            ParameterValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn fits(self, ty: ParameterType) -> bool {
        matches!(
            (self, ty),
            (ParameterValue::Float(_), ParameterType::Float)
                | (ParameterValue::Int(_), ParameterType::Int)
                | (ParameterValue::Bool(_), ParameterType::Bool)
                | (ParameterValue::Bool(_), ParameterType::Trigger)
        )
    }
}

/// Authoring-side parameter declaration. `default` is read according to `ty`:
/// rounded for ints, non-zero for bools and triggers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParameterType,
    #[serde(default)]
    pub default: f32,
}

impl ParameterDef {
    pub fn new(name: impl Into<String>, ty: ParameterType, default: f32) -> Self {
        Self {
            name: name.into(),
            ty,
            default,
        }
    }

    fn default_value(&self) -> ParameterValue {
        match self.ty {
            ParameterType::Float => ParameterValue::Float(self.default),
            ParameterType::Int => ParameterValue::Int(self.default.round() as i32),
            ParameterType::Bool | ParameterType::Trigger => ParameterValue::Bool(self.default != 0.0),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ParameterSpec {
    pub name: String,
    pub hash: NameHash,
    pub ty: ParameterType,
    pub default: ParameterValue,
    /// Driven by a float curve of the same name in some clip of the graph.
    pub curve_controlled: bool,
}

/// Ordered parameter declarations with a hash→index table built once.
#[derive(Clone, Debug, Default)]
pub struct ParameterSchema {
    params: Vec<ParameterSpec>,
    index: FastMap<NameHash, usize>,
}

impl ParameterSchema {
    pub fn build(defs: &[ParameterDef]) -> Result<Self, BuildError> {
        let mut params = Vec::with_capacity(defs.len());
        let mut index = FastMap::default();
        for def in defs {
            let hash = name_hash(&def.name);
            if index.insert(hash, params.len()).is_some() {
                return Err(BuildError::DuplicateParameter {
                    name: def.name.clone(),
                });
            }
            params.push(ParameterSpec {
                name: def.name.clone(),
                hash,
                ty: def.ty,
                default: def.default_value(),
                curve_controlled: false,
            });
        }
        Ok(Self { params, index })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    #[inline]
    pub fn index_of(&self, hash: NameHash) -> Option<usize> {
        self.index.get(&hash).copied()
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.index_of(name_hash(name))
    }

    #[inline]
    pub fn spec(&self, index: usize) -> Option<&ParameterSpec> {
        self.params.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.params.iter()
    }

    pub fn resolve(&self, id: ParameterId) -> Option<usize> {
        match id {
            ParameterId::Hash(h) => self.index_of(h),
            ParameterId::Index(i) if i < self.params.len() => Some(i),
            ParameterId::Index(_) => None,
        }
    }

    /// Flag a float parameter as curve-driven. Returns the index when it matched.
    pub(crate) fn mark_curve_controlled(&mut self, hash: NameHash) -> Option<usize> {
        let idx = self.index_of(hash)?;
        let spec = &mut self.params[idx];
        if spec.ty == ParameterType::Float {
            spec.curve_controlled = true;
            Some(idx)
        } else {
            None
        }
    }
}

/// Parameter reference by name hash or by schema position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParameterId {
    Hash(NameHash),
    Index(usize),
}

impl From<NameHash> for ParameterId {
    fn from(h: NameHash) -> Self {
        ParameterId::Hash(h)
    }
}

impl From<usize> for ParameterId {
    fn from(i: usize) -> Self {
        ParameterId::Index(i)
    }
}

impl From<&str> for ParameterId {
    fn from(name: &str) -> Self {
        ParameterId::Hash(name_hash(name))
    }
}

/// Per-instance parameter values, always exactly `schema.len()` entries.
#[derive(Clone, Debug)]
pub struct ValueStore {
    schema: Arc<ParameterSchema>,
    values: Vec<ParameterValue>,
}

impl ValueStore {
    pub fn new(schema: Arc<ParameterSchema>) -> Self {
        let values = schema.iter().map(|p| p.default).collect();
        Self { schema, values }
    }

    #[inline]
    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, id: impl Into<ParameterId>) -> Result<ParameterValue, ValueError> {
        let idx = self.schema.resolve(id.into()).ok_or(ValueError::DoesNotExist)?;
        Ok(self.values[idx])
    }

    pub fn set(&mut self, id: impl Into<ParameterId>, value: ParameterValue) -> Result<(), ValueError> {
        let idx = self.schema.resolve(id.into()).ok_or(ValueError::DoesNotExist)?;
        let spec = &self.schema.params[idx];
        if !value.fits(spec.ty) {
            return Err(ValueError::TypeMismatch { stored: spec.ty });
        }
        if spec.curve_controlled {
            return Err(ValueError::ControlledByCurve);
        }
        self.values[idx] = value;
        Ok(())
    }

    pub fn get_float(&self, id: impl Into<ParameterId>) -> Result<f32, ValueError> {
        match self.typed(id.into())? {
            (ParameterValue::Float(v), _) => Ok(v),
            (_, stored) => Err(ValueError::TypeMismatch { stored }),
        }
    }

    pub fn get_int(&self, id: impl Into<ParameterId>) -> Result<i32, ValueError> {
        match self.typed(id.into())? {
            (ParameterValue::Int(v), _) => Ok(v),
            (_, stored) => Err(ValueError::TypeMismatch { stored }),
        }
    }

    /// Bools and triggers.
    pub fn get_bool(&self, id: impl Into<ParameterId>) -> Result<bool, ValueError> {
        match self.typed(id.into())? {
            (ParameterValue::Bool(v), _) => Ok(v),
            (_, stored) => Err(ValueError::TypeMismatch { stored }),
        }
    }

    fn typed(&self, id: ParameterId) -> Result<(ParameterValue, ParameterType), ValueError> {
        let idx = self.schema.resolve(id).ok_or(ValueError::DoesNotExist)?;
        Ok((self.values[idx], self.schema.params[idx].ty))
    }

    pub fn set_trigger(&mut self, id: impl Into<ParameterId>) -> Result<(), ValueError> {
        self.write_trigger(id.into(), true)
    }

    pub fn reset_trigger(&mut self, id: impl Into<ParameterId>) -> Result<(), ValueError> {
        self.write_trigger(id.into(), false)
    }

    fn write_trigger(&mut self, id: ParameterId, on: bool) -> Result<(), ValueError> {
        let idx = self.schema.resolve(id).ok_or(ValueError::DoesNotExist)?;
        let ty = self.schema.params[idx].ty;
        if ty != ParameterType::Trigger {
            return Err(ValueError::TypeMismatch { stored: ty });
        }
        self.values[idx] = ParameterValue::Bool(on);
        Ok(())
    }

    /// Raw value by resolved index (hot path; indices come from the built graph).
    #[inline]
    pub fn at(&self, index: usize) -> Option<ParameterValue> {
        self.values.get(index).copied()
    }

    #[inline]
    pub fn float_at(&self, index: usize) -> f32 {
        self.values.get(index).map_or(0.0, |v| v.as_f32())
    }

    /// Pipeline-only write for curve-driven floats.
    pub(crate) fn write_curve(&mut self, index: usize, value: f32) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = ParameterValue::Float(value);
        }
    }

    /// Consume a trigger after the transition that tested it started.
    pub(crate) fn consume_trigger(&mut self, index: usize) {
        if let (Some(spec), Some(slot)) = (self.schema.params.get(index), self.values.get_mut(index)) {
            if spec.ty == ParameterType::Trigger {
                *slot = ParameterValue::Bool(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Arc<ParameterSchema> {
        let mut s = ParameterSchema::build(&[
            ParameterDef::new("Speed", ParameterType::Float, 0.0),
            ParameterDef::new("Grounded", ParameterType::Bool, 1.0),
            ParameterDef::new("Jump", ParameterType::Trigger, 0.0),
            ParameterDef::new("Combo", ParameterType::Int, 2.0),
            ParameterDef::new("Curve", ParameterType::Float, 0.25),
        ])
        .unwrap();
        s.mark_curve_controlled(name_hash("Curve"));
        Arc::new(s)
    }

    #[test]
    fn defaults_follow_type() {
        let store = ValueStore::new(schema());
        assert_eq!(store.len(), 5);
        assert_eq!(store.get_bool("Grounded"), Ok(true));
        assert_eq!(store.get_int("Combo"), Ok(2));
    }

    #[test]
    fn hash_lookup_matches_index_lookup() {
        let s = schema();
        for (i, spec) in s.iter().enumerate() {
            assert_eq!(s.resolve(ParameterId::Hash(spec.hash)), Some(i));
            assert_eq!(s.resolve(ParameterId::Index(i)), Some(i));
        }
        assert_eq!(s.resolve(ParameterId::Index(99)), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut store = ValueStore::new(schema());
        store.set("Speed", ParameterValue::Float(3.5)).unwrap();
        assert_eq!(store.get("Speed"), Ok(ParameterValue::Float(3.5)));
    }

    #[test]
    fn curve_controlled_rejects_and_keeps_value() {
        let mut store = ValueStore::new(schema());
        assert_eq!(
            store.set("Curve", ParameterValue::Float(1.0)),
            Err(ValueError::ControlledByCurve)
        );
        assert_eq!(store.get_float("Curve"), Ok(0.25));
        store.write_curve(4, 0.75);
        assert_eq!(store.get_float("Curve"), Ok(0.75));
    }

    #[test]
    fn mismatch_and_missing() {
        let mut store = ValueStore::new(schema());
        assert!(matches!(
            store.set("Speed", ParameterValue::Bool(true)),
            Err(ValueError::TypeMismatch { .. })
        ));
        assert_eq!(store.get("Nope"), Err(ValueError::DoesNotExist));
        assert!(store.set_trigger("Speed").is_err());
        store.set_trigger("Jump").unwrap();
        assert_eq!(store.get_bool("Jump"), Ok(true));
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = ParameterSchema::build(&[
            ParameterDef::new("A", ParameterType::Float, 0.0),
            ParameterDef::new("A", ParameterType::Int, 0.0),
        ])
        .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateParameter { .. }));
    }
}
