//! PropertyPath parsing and formatting.
//!
//! Grammar:
//!   node/path#Component.field[.sub]
//! - '/' separates transform-hierarchy segments, relative to the animated root
//! - the node path may be empty, which addresses the root itself
//! - '#' introduces the component type name
//! - at least one '.'-separated field follows the component
//!   Examples:
//!   "Body/Head#SkinnedMesh.blendShape.smile" -> node=["Body","Head"], component="SkinnedMesh", fields=["blendShape","smile"]
//!   "#Light.intensity" -> node=[], component="Light", fields=["intensity"]

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty property path")]
    Empty,
    #[error("property path '{0}' has no '#Component' section")]
    MissingComponent(String),
    #[error("property path '{0}' has an empty node segment")]
    EmptySegment(String),
    #[error("property path '{0}' has no field selector")]
    MissingField(String),
    #[error("property path '{path}': {reason}")]
    Invalid { path: String, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    /// Transform-hierarchy segments from the animated root (may be empty)
    pub node: Vec<String>,
    /// Component type name
    pub component: String,
    /// Ordered field selectors on the component (never empty)
    pub fields: Vec<String>,
}

impl PropertyPath {
    pub fn new(node: Vec<String>, component: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            node,
            component: component.into(),
            fields,
        }
    }

    pub fn parse(s: &str) -> Result<Self, PathError> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        let (node_part, comp_part) = s
            .split_once('#')
            .ok_or_else(|| PathError::MissingComponent(s.to_string()))?;

        let node: Vec<String> = if node_part.is_empty() {
            Vec::new()
        } else {
            let segs: Vec<&str> = node_part.split('/').collect();
            if segs.iter().any(|seg| seg.is_empty()) {
                return Err(PathError::EmptySegment(s.to_string()));
            }
            segs.into_iter().map(str::to_string).collect()
        };

        let mut parts = comp_part.split('.');
        let component = parts.next().unwrap_or_default();
        if component.is_empty() {
            return Err(PathError::MissingComponent(s.to_string()));
        }
        if component.contains('#') || component.chars().any(char::is_whitespace) {
            return Err(PathError::Invalid {
                path: s.to_string(),
                reason: "component name contains '#' or whitespace",
            });
        }
        let fields: Vec<String> = parts.map(str::to_string).collect();
        if fields.is_empty() {
            return Err(PathError::MissingField(s.to_string()));
        }
        if fields
            .iter()
            .any(|f| f.is_empty() || f.chars().any(char::is_whitespace))
        {
            return Err(PathError::Invalid {
                path: s.to_string(),
                reason: "empty field or field containing whitespace",
            });
        }

        Ok(PropertyPath {
            node,
            component: component.to_string(),
            fields,
        })
    }

    /// Node path joined with '/', the key used to resolve the owning transform.
    pub fn node_path(&self) -> String {
        self.node.join("/")
    }

    pub fn field_path(&self) -> String {
        self.fields.join(".")
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}.{}",
            self.node.join("/"),
            self.component,
            self.fields.join(".")
        )
    }
}

impl FromStr for PropertyPath {
    type Err = PathError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyPath::parse(s)
    }
}

impl Serialize for PropertyPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PropertyPath {
    fn deserialize<D>(deserializer: D) -> Result<PropertyPath, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PropertyPath::parse(&s).map_err(de::Error::custom)
    }
}
