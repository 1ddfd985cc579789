//! Probability propagation. Each edge carries the parent's per-weight reach
//! probability into the child, thinned by the chance the child is free.
//! Contributions from different parents combine as unions of independent
//! events, which keeps every bucket inside [0, 1] no matter how many
//! disjoint paths feed it.

use crate::distances::TraversalDir;
use crate::error::AnalysisError;
use crate::models::{node_free_probability, probability_or};
use crate::traversal::{TraversalCallbacks, TraversalCtx};
use wotan_common::arch::BlockType;
use wotan_common::graph::RRNodeId;

pub struct PropagateVisitor<'a> {
    source: RRNodeId,
    sink: RRNodeId,
    fill_type: Option<&'a BlockType>,
    pub prob_routable: f32,
    pub error: Option<AnalysisError>,
}

impl<'a> PropagateVisitor<'a> {
    pub fn new(source: RRNodeId, sink: RRNodeId, fill_type: Option<&'a BlockType>) -> Self {
        Self {
            source,
            sink,
            fill_type,
            prob_routable: 0.0,
            error: None,
        }
    }
}

impl TraversalCallbacks for PropagateVisitor<'_> {
    fn node_popped(&mut self, _ctx: &mut TraversalCtx<'_>, _node: RRNodeId) {}

    fn child_iterated(&mut self, ctx: &mut TraversalCtx<'_>, parent: RRNodeId, child: RRNodeId) {
        if self.error.is_some() || ctx.dir != TraversalDir::Forward {
            return;
        }
        let p_free = match node_free_probability(
            ctx.graph,
            child,
            self.source,
            self.sink,
            self.fill_type,
            ctx.opts,
        ) {
            Ok(p) => p,
            Err(e) => {
                self.error = Some(e);
                return;
            }
        };

        let fold_weight = ctx.graph[child].weight;
        if fold_weight < 0 || fold_weight > ctx.max_path_weight {
            return;
        }
        let fw = fold_weight as usize;
        let maxw = ctx.max_path_weight as usize;

        let (parent_row, child_row) = ctx.state.topo.source_rows(parent, child);
        for k in 0..=maxw - fw {
            let contribution = parent_row[k] as f64 * p_free;
            if contribution != 0.0 {
                child_row[k + fw] = probability_or(child_row[k + fw], contribution);
            }
        }
    }

    fn traversal_done(&mut self, ctx: &mut TraversalCtx<'_>) {
        if self.error.is_some() {
            return;
        }
        // Chance that no weight class reaches the sink, complemented.
        let row = ctx.state.topo.source_buckets(self.sink);
        let mut all_miss = 1.0f64;
        for &bucket in row.iter().take(ctx.max_path_weight.max(0) as usize + 1) {
            all_miss *= 1.0 - (bucket as f64).clamp(0.0, 1.0);
        }
        self.prob_routable = (1.0 - all_miss) as f32;
    }
}
