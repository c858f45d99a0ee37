//! rigmotion-api-core: value model shared by the animation engine and its hosts.
//!
//! Generic (non-skeletal) animated properties are addressed by a [`PropertyPath`]
//! (`node/path#Component.field`) and carried as [`Value`]s inside a [`WriteBatch`].

pub mod blend;
pub mod coercion;
pub mod property_path;
pub mod value;
pub mod write_ops;

pub use property_path::{PathError, PropertyPath};
pub use value::{ObjectId, Value, ValueKind};
pub use write_ops::{PropertyWrite, WriteBatch};
