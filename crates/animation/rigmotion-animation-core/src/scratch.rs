//! Per-instance working buffers, sized once at bind and reused every tick.

use crate::accumulate::LayerPose;
use crate::blend_tree::Leaf;
use crate::config::ScratchCfg;
use crate::human::HumanPose;
use crate::sampling::ActiveLeaf;

#[derive(Debug)]
pub struct Scratch {
    /// Flattened leaves of the layer being evaluated.
    pub leaves: Vec<Leaf>,
    pub active: Vec<ActiveLeaf>,
    /// Blend tree weight stack.
    pub weights: Vec<f32>,
    /// Weight stack for duration queries.
    pub durations: Vec<f32>,
    pub human: HumanPose,
    pub layers: Vec<LayerPose>,
    pub output: LayerPose,
}

impl Scratch {
    pub fn new(cfg: &ScratchCfg, layers: usize, nodes: usize, properties: usize, parameters: usize) -> Self {
        Self {
            leaves: Vec::with_capacity(cfg.leaves),
            active: Vec::with_capacity(cfg.leaves),
            weights: Vec::with_capacity(cfg.leaves),
            durations: Vec::with_capacity(cfg.leaves),
            human: HumanPose::default(),
            layers: (0..layers)
                .map(|_| LayerPose::new(nodes, properties, parameters))
                .collect(),
            output: LayerPose::new(nodes, properties, parameters),
        }
    }

    #[inline]
    pub fn begin_frame(&mut self) {
        self.leaves.clear();
        self.active.clear();
        self.weights.clear();
        self.output.clear();
    }
}
