//! Shared, named controller graphs with guarded hot-reload.
//!
//! Hosts keep an `Arc<ControllerLibrary>` and may call into it from their
//! callbacks. Replacing or removing a graph is refused while a step is in
//! flight; instances pick up a replaced graph at the start of the next step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use rigmotion_animation_core::{BuildError, ControllerDef, ControllerGraph};

#[derive(Debug, Clone)]
struct Slot {
    graph: Arc<ControllerGraph>,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct ControllerLibrary {
    slots: RwLock<IndexMap<String, Slot>>,
    in_flight: AtomicBool,
}

/// Marks a step in flight until dropped.
pub(crate) struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ControllerLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build `def` and store it under `name`, replacing nothing: an existing
    /// name is reported through `replace` semantics instead.
    pub fn register(&self, name: &str, def: &ControllerDef) -> Result<Arc<ControllerGraph>, BuildError> {
        if self.contains(name) {
            return self.replace(name, def);
        }
        let graph = build(name, def)?;
        self.insert_graph(name, Arc::clone(&graph));
        Ok(graph)
    }

    /// Store an already built graph under a new name.
    pub fn insert_graph(&self, name: &str, graph: Arc<ControllerGraph>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let generation = slots.get(name).map_or(0, |s| s.generation + 1);
        slots.insert(name.to_string(), Slot { graph, generation });
    }

    /// Rebuild the graph stored under `name`. Refused while a step is in flight.
    pub fn replace(&self, name: &str, def: &ControllerDef) -> Result<Arc<ControllerGraph>, BuildError> {
        if self.is_in_flight() {
            log::error!("replace of controller '{name}' refused: a tick is in flight");
            return Err(BuildError::TickInFlight);
        }
        if !self.contains(name) {
            return Err(BuildError::ControllerNotFound { name: name.to_string() });
        }
        let graph = build(name, def)?;
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(name) {
            slot.graph = Arc::clone(&graph);
            slot.generation += 1;
        }
        log::debug!("controller '{name}' replaced");
        Ok(graph)
    }

    /// Remove `name`. Instances already bound keep their graph.
    pub fn remove(&self, name: &str) -> Result<Arc<ControllerGraph>, BuildError> {
        if self.is_in_flight() {
            log::error!("removal of controller '{name}' refused: a tick is in flight");
            return Err(BuildError::TickInFlight);
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(name)
            .map(|s| s.graph)
            .ok_or_else(|| BuildError::ControllerNotFound { name: name.to_string() })
    }

    pub fn get(&self, name: &str) -> Option<Arc<ControllerGraph>> {
        self.read(name, |s| Arc::clone(&s.graph))
    }

    /// Bumped on every replace.
    pub fn generation(&self, name: &str) -> Option<u64> {
        self.read(name, |s| s.generation)
    }

    pub(crate) fn get_with_generation(&self, name: &str) -> Option<(Arc<ControllerGraph>, u64)> {
        self.read(name, |s| (Arc::clone(&s.graph), s.generation))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read(name, |_| ()).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn begin_step(&self) -> InFlight<'_> {
        self.in_flight.store(true, Ordering::Release);
        InFlight(&self.in_flight)
    }

    fn read<R>(&self, name: &str, f: impl FnOnce(&Slot) -> R) -> Option<R> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(f)
    }
}

fn build(name: &str, def: &ControllerDef) -> Result<Arc<ControllerGraph>, BuildError> {
    def.build().map_err(|e| {
        log::error!("controller '{name}' failed to build: {e}");
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigmotion_test_fixtures::builders;

    #[test]
    fn replace_bumps_generation() {
        let lib = ControllerLibrary::new();
        lib.register("loco", &builders::locomotion_controller()).unwrap();
        assert_eq!(lib.generation("loco"), Some(0));
        lib.replace("loco", &builders::locomotion_controller()).unwrap();
        assert_eq!(lib.generation("loco"), Some(1));
        assert_eq!(lib.names(), ["loco"]);
    }

    #[test]
    fn replace_is_refused_in_flight() {
        let lib = ControllerLibrary::new();
        lib.register("loco", &builders::locomotion_controller()).unwrap();
        {
            let _guard = lib.begin_step();
            assert_eq!(
                lib.replace("loco", &builders::locomotion_controller()).unwrap_err(),
                BuildError::TickInFlight
            );
            assert_eq!(lib.remove("loco").unwrap_err(), BuildError::TickInFlight);
        }
        assert!(!lib.is_in_flight());
        assert!(lib.replace("loco", &builders::locomotion_controller()).is_ok());
    }

    #[test]
    fn unknown_controller() {
        let lib = ControllerLibrary::new();
        assert!(matches!(
            lib.replace("nope", &builders::wave_controller()),
            Err(BuildError::ControllerNotFound { .. })
        ));
        assert!(lib.get("nope").is_none());
    }
}
