//! Input contracts: state requests queued by the per-instance API and applied
//! at the start of the next tick.

use serde::{Deserialize, Serialize};

/// Explicit go-to-state request on one layer. `state` is a resolved state index.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StateRequest {
    /// Jump immediately, cancelling any transition.
    Play { state: usize, normalized_time: f32 },
    /// Blend into `state` over `duration` seconds. Deferred while an atomic
    /// transition is running.
    CrossFade {
        state: usize,
        duration: f32,
        normalized_time: f32,
    },
}

impl StateRequest {
    pub fn state(&self) -> usize {
        match *self {
            StateRequest::Play { state, .. } | StateRequest::CrossFade { state, .. } => state,
        }
    }
}
