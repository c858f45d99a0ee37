//! rigmotion-orchestrator
//!
//! Owns a set of animated instances and advances them together. Each step
//! runs the animator pipeline as six ordered stages: the per-instance stages
//! go through an injected [`ParallelFor`], while host callbacks, the merge of
//! generic property writes and recorder capture run serially in insertion
//! order. Controllers are shared through a [`ControllerLibrary`] that refuses
//! hot-reload while a step is in flight.

pub mod diagnostics;
pub mod host;
pub mod library;
pub mod properties;
pub mod scheduler;

use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use rigmotion_animation_core::{Animator, AnimatorConfig, AvatarConstant, BuildError, IdAllocator, InstId, SceneRig};
use rigmotion_api_core::WriteBatch;

pub use crate::diagnostics::DiagnosticsCfg;
pub use crate::host::{AnimatorHost, FrameEvent, NullHost};
pub use crate::library::ControllerLibrary;
pub use crate::properties::{ConflictLog, PropertyEntry, PropertyStore};
pub use crate::scheduler::{ParallelFor, RayonParallel, Schedule, SerialParallel};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub schedule: Schedule,
    pub diagnostics: DiagnosticsCfg,
    /// Configuration given to instances created by [`Orchestrator::spawn`].
    pub animator: AnimatorConfig,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("Controller '{0}' is not registered")]
    UnknownController(String),
    #[error("Instance {0:?} does not exist")]
    UnknownInstance(InstId),
    #[error(transparent)]
    Build(#[from] BuildError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorFrame {
    pub epoch: u64,
    pub dt: f32,
    /// Generic property writes of the step, in insertion order of their instances.
    pub writes: WriteBatch,
    pub conflicts: Vec<ConflictLog>,
    pub timings_ms: hashbrown::HashMap<String, f32>,
    /// Every event delivered to the host during the step, in delivery order.
    pub events: Vec<FrameEvent>,
}

pub(crate) struct Entity {
    pub animator: Animator,
    /// Library name the instance follows for hot-reload.
    pub controller: Option<String>,
    pub generation: u64,
}

pub struct Orchestrator {
    pub(crate) config: OrchestratorConfig,
    pub(crate) library: Arc<ControllerLibrary>,
    pub(crate) entities: IndexMap<InstId, Entity>,
    pub(crate) properties: PropertyStore,
    pub(crate) pool: Box<dyn ParallelFor>,
    pub(crate) epoch: u64,
    ids: IdAllocator,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, library: Arc<ControllerLibrary>) -> Self {
        let pool = config.schedule.pool();
        Self::with_pool(config, library, pool)
    }

    /// Use a caller-provided parallel primitive instead of the one named by
    /// `config.schedule`.
    pub fn with_pool(config: OrchestratorConfig, library: Arc<ControllerLibrary>, pool: Box<dyn ParallelFor>) -> Self {
        Self {
            config,
            library,
            entities: IndexMap::new(),
            properties: PropertyStore::new(),
            pool,
            epoch: 0,
            ids: IdAllocator::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn library(&self) -> &Arc<ControllerLibrary> {
        &self.library
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Create an instance on `rig` bound to the library controller
    /// `controller`. Nothing is inserted when binding fails.
    pub fn spawn(
        &mut self,
        rig: SceneRig,
        controller: &str,
        avatar: Arc<AvatarConstant>,
    ) -> Result<InstId, OrchestratorError> {
        let (graph, generation) = self
            .library
            .get_with_generation(controller)
            .ok_or_else(|| OrchestratorError::UnknownController(controller.to_string()))?;
        let mut animator = Animator::new(rig, self.config.animator.clone());
        animator.bind(graph, avatar)?;
        let id = self.ids.alloc_inst();
        self.entities.insert(
            id,
            Entity {
                animator,
                controller: Some(controller.to_string()),
                generation,
            },
        );
        log::debug!("spawned instance {} with controller '{controller}'", id.0);
        Ok(id)
    }

    /// Adopt an animator the host built itself. It is not tied to the library
    /// and is skipped by every stage while uninitialized.
    pub fn insert(&mut self, animator: Animator) -> InstId {
        let id = self.ids.alloc_inst();
        self.entities.insert(
            id,
            Entity {
                animator,
                controller: None,
                generation: 0,
            },
        );
        id
    }

    /// Remove an instance, keeping the order of the rest.
    pub fn remove(&mut self, id: InstId) -> Result<Animator, OrchestratorError> {
        self.entities
            .shift_remove(&id)
            .map(|e| e.animator)
            .ok_or(OrchestratorError::UnknownInstance(id))
    }

    pub fn get(&self, id: InstId) -> Option<&Animator> {
        self.entities.get(&id).map(|e| &e.animator)
    }

    pub fn get_mut(&mut self, id: InstId) -> Option<&mut Animator> {
        self.entities.get_mut(&id).map(|e| &mut e.animator)
    }

    /// Instance ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = InstId> + '_ {
        self.entities.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    /// Advance every instance by `dt` seconds.
    pub fn step(&mut self, dt: f32, host: &mut dyn AnimatorHost) -> Result<OrchestratorFrame> {
        self.epoch = self.epoch.wrapping_add(1);
        scheduler::refresh_bindings(self);

        let library = Arc::clone(&self.library);
        let _in_flight = library.begin_step();
        scheduler::run_stages(self, dt, host)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default(), Arc::new(ControllerLibrary::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigmotion_test_fixtures::builders;

    fn library() -> Arc<ControllerLibrary> {
        let lib = ControllerLibrary::new();
        lib.register("wave", &builders::wave_controller()).unwrap();
        Arc::new(lib)
    }

    #[test]
    fn spawn_unknown_controller_inserts_nothing() {
        let mut orch = Orchestrator::new(OrchestratorConfig::default(), library());
        let err = orch
            .spawn(builders::generic_rig(), "missing", builders::generic_avatar())
            .unwrap_err();
        assert_eq!(err, OrchestratorError::UnknownController("missing".into()));
        assert!(orch.is_empty());
    }

    #[test]
    fn spawn_failed_bind_inserts_nothing() {
        let mut orch = Orchestrator::new(OrchestratorConfig::default(), library());
        let lib = orch.library().clone();
        lib.register("loco", &builders::locomotion_controller()).unwrap();
        // humanoid controller on a generic avatar
        let err = orch
            .spawn(builders::generic_rig(), "loco", builders::generic_avatar())
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Build(_)));
        assert!(orch.is_empty());
    }

    #[test]
    fn remove_keeps_order() {
        let mut orch = Orchestrator::new(OrchestratorConfig::default(), library());
        let a = orch.spawn(builders::generic_rig(), "wave", builders::generic_avatar()).unwrap();
        let b = orch.spawn(builders::generic_rig(), "wave", builders::generic_avatar()).unwrap();
        let c = orch.spawn(builders::generic_rig(), "wave", builders::generic_avatar()).unwrap();
        assert!(orch.remove(b).is_ok());
        assert_eq!(orch.ids().collect::<Vec<_>>(), [a, c]);
        assert!(matches!(orch.remove(b), Err(OrchestratorError::UnknownInstance(id)) if id == b));
    }

    #[test]
    fn config_from_partial_json() {
        let cfg: OrchestratorConfig =
            serde_json::from_str(r#"{ "schedule": "Serial", "animator": { "speed": 2.0 } }"#).unwrap();
        assert_eq!(cfg.schedule, Schedule::Serial);
        assert!(cfg.diagnostics.enabled);
        assert_eq!(cfg.animator.speed, 2.0);
    }
}
