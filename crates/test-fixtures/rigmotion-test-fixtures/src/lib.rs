//! Shared fixtures for rigmotion tests and benches.
//!
//! JSON fixtures live under `fixtures/` at the workspace root and are listed
//! in `fixtures/manifest.json`. Programmatic builders for the common rigs,
//! clips and controllers are in [`builders`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use rigmotion_animation_core::{AvatarConstant, AvatarDef, ControllerDef, ControllerGraph};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub mod builders;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    controllers: HashMap<String, String>,
    avatars: HashMap<String, String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path).with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a>(map: &'a HashMap<String, String>, kind: &str, name: &str) -> Result<&'a str> {
    map.get(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod controllers {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.controllers.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        read_to_string(lookup(&MANIFEST.controllers, "controller", name)?)
    }

    pub fn load(name: &str) -> Result<ControllerDef> {
        super::load_json(lookup(&MANIFEST.controllers, "controller", name)?)
    }

    /// Load and build into a shared graph.
    pub fn graph(name: &str) -> Result<Arc<ControllerGraph>> {
        let def = load(name)?;
        ControllerGraph::build(&def).with_context(|| format!("controller fixture '{name}' failed to build"))
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        Ok(resolve_path(lookup(&MANIFEST.controllers, "controller", name)?))
    }
}

pub mod avatars {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.avatars.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        read_to_string(lookup(&MANIFEST.avatars, "avatar", name)?)
    }

    pub fn load(name: &str) -> Result<AvatarDef> {
        super::load_json(lookup(&MANIFEST.avatars, "avatar", name)?)
    }

    pub fn constant(name: &str) -> Result<Arc<AvatarConstant>> {
        let def = load(name)?;
        AvatarConstant::build(&def).with_context(|| format!("avatar fixture '{name}' failed to build"))
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        Ok(resolve_path(lookup(&MANIFEST.avatars, "avatar", name)?))
    }
}
