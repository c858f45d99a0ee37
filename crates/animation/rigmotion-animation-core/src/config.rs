//! Per-instance animator configuration.

use serde::{Deserialize, Serialize};

/// What an instance still does while it is not visible.
/// Variants are ordered from least to most culling.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum CullingMode {
    /// Retarget, solve IK and write the pose even when invisible.
    AlwaysAnimate,
    /// Keep state machines and root motion running; skip retarget, IK and pose writes.
    #[default]
    CullUpdateTransforms,
    /// Skip the whole pipeline while invisible.
    CullCompletely,
}

/// Configuration for sizing, playback defaults and culling.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatorConfig {
    /// Global playback speed multiplier.
    pub speed: f32,
    /// Apply root motion to the instance root when the host does not handle it.
    pub apply_root_motion: bool,
    pub culling: CullingMode,
    /// Maximum number of frames kept by the recorder.
    pub recorder_capacity: usize,
    /// Events beyond this count in one tick are dropped (with a warning).
    pub max_events_per_tick: usize,
    pub scratch: ScratchCfg,
}

/// Initial capacity hints for the per-tick workspace buffers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchCfg {
    pub leaves: usize,
    pub writes: usize,
    pub events: usize,
}

impl Default for ScratchCfg {
    fn default() -> Self {
        Self {
            leaves: 32,
            writes: 64,
            events: 16,
        }
    }
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            apply_root_motion: true,
            culling: CullingMode::default(),
            recorder_capacity: 600,
            max_events_per_tick: 256,
            scratch: ScratchCfg::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: AnimatorConfig =
            serde_json::from_str(r#"{ "speed": 2.0, "culling": "AlwaysAnimate" }"#).unwrap();
        assert_eq!(cfg.speed, 2.0);
        assert_eq!(cfg.culling, CullingMode::AlwaysAnimate);
        assert!(cfg.apply_root_motion);
        assert_eq!(cfg.recorder_capacity, 600);
    }
}
