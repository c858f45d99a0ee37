//! Motion: what a state plays. A closed variant over clips and blend trees,
//! both referenced by index into arenas owned by the controller graph.

use crate::blend_tree;
use crate::controller::ControllerGraph;
use crate::ids::{BlendTreeId, ClipId};
use crate::values::ValueStore;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Motion {
    Clip(ClipId),
    BlendTree(BlendTreeId),
}

impl Motion {
    /// Duration in seconds for the current parameters. Blend trees report the
    /// weighted duration of their children.
    pub fn duration(self, graph: &ControllerGraph, values: &ValueStore) -> f32 {
        match self {
            Motion::Clip(id) => graph.clip(id).map_or(0.0, |c| c.duration),
            Motion::BlendTree(_) => {
                let mut buf = Vec::new();
                blend_tree::weighted_duration(graph, self, values, &mut buf)
            }
        }
    }

    /// A blend tree loops when any of its clips loops.
    pub fn is_looping(self, graph: &ControllerGraph) -> bool {
        match self {
            Motion::Clip(id) => graph.clip(id).is_some_and(|c| c.looping),
            Motion::BlendTree(id) => graph
                .blend_tree(id)
                .is_some_and(|t| t.children().iter().any(|c| c.motion.is_looping(graph))),
        }
    }

    /// Every clip reachable from this motion, depth first, with duplicates.
    pub fn collect_clips(self, graph: &ControllerGraph, out: &mut Vec<ClipId>) {
        match self {
            Motion::Clip(id) => out.push(id),
            Motion::BlendTree(id) => {
                if let Some(tree) = graph.blend_tree(id) {
                    for child in tree.children() {
                        child.motion.collect_clips(graph, out);
                    }
                }
            }
        }
    }
}
