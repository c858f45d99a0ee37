use std::time::Instant;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Diagnostics configuration for the orchestrator step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsCfg {
    /// Measure wall-clock time per stage into `OrchestratorFrame::timings_ms`.
    pub enabled: bool,
    /// Also emit the timings through `log::debug!`.
    pub log_stage_timings: bool,
}

impl Default for DiagnosticsCfg {
    fn default() -> Self {
        DiagnosticsCfg {
            enabled: true,
            log_stage_timings: false,
        }
    }
}

/// Per-step stage timer. Does nothing when diagnostics are disabled.
pub(crate) struct StageTimer {
    enabled: bool,
    log: bool,
    start: Instant,
    last: Instant,
    timings: HashMap<String, f32>,
}

impl StageTimer {
    pub fn new(cfg: &DiagnosticsCfg) -> Self {
        let now = Instant::now();
        Self {
            enabled: cfg.enabled,
            log: cfg.enabled && cfg.log_stage_timings,
            start: now,
            last: now,
            timings: HashMap::new(),
        }
    }

    /// Record the time since the previous mark under `<stage>_ms`.
    pub fn mark(&mut self, stage: &str) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let ms = now.duration_since(self.last).as_secs_f32() * 1000.0;
        self.last = now;
        if self.log {
            log::debug!("stage {stage}: {ms:.3} ms");
        }
        self.timings.insert(format!("{stage}_ms"), ms);
    }

    pub fn finish(mut self, epoch: u64) -> HashMap<String, f32> {
        if self.enabled {
            let total = self.start.elapsed().as_secs_f32() * 1000.0;
            if self.log {
                log::debug!("step {epoch}: {total:.3} ms");
            }
            self.timings.insert("total_ms".to_string(), total);
        }
        self.timings
    }
}
