//! Host callbacks for a whole set of instances.
//!
//! The orchestrator calls these only from its serialized stages, one instance
//! at a time in insertion order.

use serde::{Deserialize, Serialize};

use rigmotion_animation_core::{AnimatorCallbacks, AnimatorEvent, IkGoals, InstId, RootMotion, RootTransform};

pub trait AnimatorHost {
    fn on_animation_event(&mut self, _inst: InstId, _event: &AnimatorEvent) {}

    /// Return true when the host applied the motion itself.
    fn on_animator_move(&mut self, _inst: InstId, _motion: &RootMotion, _root: &mut RootTransform) -> bool {
        false
    }

    fn on_animator_ik(&mut self, _inst: InstId, _layer: usize, _goals: &mut dyn IkGoals) {}
}

/// Host that ignores every callback.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullHost;

impl AnimatorHost for NullHost {}

/// Event delivered during a step, tagged with its instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameEvent {
    pub inst: InstId,
    pub event: AnimatorEvent,
}

/// Adapts an `AnimatorHost` to one instance's `AnimatorCallbacks`, keeping a
/// copy of delivered events for the frame.
pub(crate) struct InstanceBridge<'a> {
    pub inst: InstId,
    pub host: &'a mut dyn AnimatorHost,
    pub events: &'a mut Vec<FrameEvent>,
}

impl AnimatorCallbacks for InstanceBridge<'_> {
    fn on_animation_event(&mut self, event: &AnimatorEvent) {
        self.events.push(FrameEvent {
            inst: self.inst,
            event: event.clone(),
        });
        self.host.on_animation_event(self.inst, event);
    }

    fn on_animator_move(&mut self, motion: &RootMotion, root: &mut RootTransform) -> bool {
        self.host.on_animator_move(self.inst, motion, root)
    }

    fn on_animator_ik(&mut self, layer: usize, goals: &mut dyn IkGoals) {
        self.host.on_animator_ik(self.inst, layer, goals);
    }
}
