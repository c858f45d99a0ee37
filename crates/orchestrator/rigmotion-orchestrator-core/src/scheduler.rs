use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use rigmotion_animation_core::{Animator, InstId};
use rigmotion_api_core::WriteBatch;

use crate::diagnostics::StageTimer;
use crate::host::{AnimatorHost, FrameEvent, InstanceBridge};
use crate::properties::ConflictLog;
use crate::{Entity, Orchestrator, OrchestratorFrame};

/// Which `ParallelFor` the orchestrator builds by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Schedule {
    /// Parallel stages run on the rayon global pool.
    #[default]
    Parallel,
    /// Every stage runs on the calling thread.
    Serial,
}

/// Runs one closure over every item of a slice, possibly concurrently.
/// Implementations must call `f` exactly once per item.
pub trait ParallelFor: Send + Sync {
    fn run(&self, items: &mut [&mut Animator], f: &(dyn Fn(&mut Animator) + Sync));
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RayonParallel;

impl ParallelFor for RayonParallel {
    fn run(&self, items: &mut [&mut Animator], f: &(dyn Fn(&mut Animator) + Sync)) {
        items.par_iter_mut().for_each(|a| f(a));
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SerialParallel;

impl ParallelFor for SerialParallel {
    fn run(&self, items: &mut [&mut Animator], f: &(dyn Fn(&mut Animator) + Sync)) {
        for a in items.iter_mut() {
            f(a);
        }
    }
}

impl Schedule {
    pub fn pool(self) -> Box<dyn ParallelFor> {
        match self {
            Schedule::Parallel => Box::new(RayonParallel),
            Schedule::Serial => Box::new(SerialParallel),
        }
    }
}

/// Initialized instances in insertion order, optionally without culled ones.
fn active(entities: &mut indexmap::IndexMap<InstId, Entity>, skip_culled: bool) -> Vec<&mut Animator> {
    entities
        .values_mut()
        .map(|e| &mut e.animator)
        .filter(|a| a.is_initialized() && !(skip_culled && a.is_culled()))
        .collect()
}

/// Rebind instances whose controller was replaced in the library since they
/// were bound.
pub(crate) fn refresh_bindings(orchestrator: &mut Orchestrator) {
    let Orchestrator { library, entities, .. } = orchestrator;
    for (id, entity) in entities.iter_mut() {
        let Some(name) = entity.controller.as_deref() else { continue };
        let Some((graph, generation)) = library.get_with_generation(name) else { continue };
        if generation == entity.generation {
            continue;
        }
        entity.generation = generation;
        let Some(avatar) = entity.animator.avatar().cloned() else { continue };
        match entity.animator.bind(graph, avatar) {
            Ok(()) => log::debug!("instance {} rebound to '{name}' generation {generation}", id.0),
            Err(e) => log::error!("instance {} failed to rebind to '{name}': {e}", id.0),
        }
    }
}

/// Run the six ordered stages over every initialized instance.
///
/// Parallel stages only touch one instance each. Host callbacks, the property
/// merge and recorder capture run serially in insertion order, so the
/// resulting frame does not depend on the pool.
pub(crate) fn run_stages(
    orchestrator: &mut Orchestrator,
    dt: f32,
    host: &mut dyn AnimatorHost,
) -> Result<OrchestratorFrame> {
    let epoch = orchestrator.epoch;
    let Orchestrator {
        config,
        entities,
        properties,
        pool,
        ..
    } = orchestrator;
    let mut timer = StageTimer::new(&config.diagnostics);
    let mut events: Vec<FrameEvent> = Vec::new();
    let mut conflicts: Vec<ConflictLog> = Vec::new();
    let mut writes = WriteBatch::new();

    // 1. evaluate
    pool.run(&mut active(entities, false), &|a| a.evaluate(dt));
    timer.mark("evaluate");

    // 2. events and root motion
    for (id, entity) in entities.iter_mut() {
        if !entity.animator.is_initialized() {
            continue;
        }
        let mut bridge = InstanceBridge {
            inst: *id,
            host: &mut *host,
            events: &mut events,
        };
        entity.animator.drain_callbacks(&mut bridge);
    }
    timer.mark("callbacks");

    // 3. retarget and IK
    pool.run(&mut active(entities, true), &|a| a.retarget_and_solve());
    timer.mark("retarget");

    // 4. IK hooks
    for (id, entity) in entities.iter_mut() {
        if !entity.animator.is_initialized() || entity.animator.is_culled() {
            continue;
        }
        let mut bridge = InstanceBridge {
            inst: *id,
            host: &mut *host,
            events: &mut events,
        };
        entity.animator.run_ik_callbacks(&mut bridge);
    }
    timer.mark("ik_callbacks");

    // 5. pose write, then property merge
    pool.run(&mut active(entities, true), &|a| a.write_pose());
    for (id, entity) in entities.iter_mut() {
        if !entity.animator.is_initialized() {
            continue;
        }
        let batch = entity.animator.take_writes();
        if entity.animator.is_culled() || batch.is_empty() {
            continue;
        }
        writes.extend(batch.iter().cloned());
        conflicts.extend(properties.apply_batch(batch, epoch, *id));
    }
    timer.mark("write");

    // 6. capture
    for entity in entities.values_mut() {
        if entity.animator.is_initialized() {
            entity.animator.capture();
        }
    }
    timer.mark("capture");

    if !conflicts.is_empty() {
        log::debug!("step {epoch}: {} property conflicts", conflicts.len());
    }

    Ok(OrchestratorFrame {
        epoch,
        dt,
        writes,
        conflicts,
        timings_ms: timer.finish(epoch),
        events,
    })
}
