//! Path enumeration. A backward traversal fills sink-side buckets, then a
//! forward traversal fills source-side buckets and charges each node with the
//! (scaled) number of paths running through it.

use crate::distances::TraversalDir;
use crate::state::TopoArena;
use crate::traversal::{TraversalCallbacks, TraversalCtx};
use wotan_common::graph::{RRNode, RRNodeId, RRNodeType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnumerateMode {
    /// Buckets indexed by accumulated node weight.
    ByPathWeight,
    /// Buckets indexed by hop count; every node folds at offset 1.
    ByPathHops,
}

pub struct EnumerateVisitor {
    mode: EnumerateMode,
    source: RRNodeId,
    sink: RRNodeId,
    /// Channel nodes finalized by the forward pass. The reliability
    /// polynomial model needs this as its trial count.
    pub num_routing_nodes_in_subgraph: usize,
}

impl EnumerateVisitor {
    pub fn new(mode: EnumerateMode, source: RRNodeId, sink: RRNodeId) -> Self {
        Self {
            mode,
            source,
            sink,
            num_routing_nodes_in_subgraph: 0,
        }
    }

    fn fold_weight(&self, node: &RRNode) -> i32 {
        match self.mode {
            EnumerateMode::ByPathWeight => node.weight,
            EnumerateMode::ByPathHops => 1,
        }
    }
}

impl TraversalCallbacks for EnumerateVisitor {
    fn node_popped(&mut self, ctx: &mut TraversalCtx<'_>, node: RRNodeId) {
        if ctx.dir != TraversalDir::Forward {
            return;
        }
        let node_ref = &ctx.graph[node];
        if node_ref.rr_type.is_channel() {
            self.num_routing_nodes_in_subgraph += 1;
        }
        if matches!(node_ref.rr_type, RRNodeType::Source | RRNodeType::Sink) {
            return;
        }

        let fold_weight = self.fold_weight(node_ref);
        let paths = paths_through_node(
            ctx.state.topo.source_buckets(node),
            ctx.state.topo.sink_buckets(node),
            fold_weight,
            ctx.max_path_weight,
        );
        if paths > 0.0 {
            node_ref.add_demand(paths);
            if ctx.opts.keep_path_count_history {
                node_ref.add_path_count_history(self.source, paths);
                node_ref.add_path_count_history(self.sink, paths);
            }
        }
    }

    fn child_iterated(&mut self, ctx: &mut TraversalCtx<'_>, parent: RRNodeId, child: RRNodeId) {
        let fold_weight = self.fold_weight(&ctx.graph[child]);
        let max_weight = ctx.max_path_weight;
        match ctx.dir {
            TraversalDir::Forward => {
                let (parent_row, child_row) = ctx.state.topo.source_rows(parent, child);
                fold_into(parent_row, child_row, fold_weight, max_weight);
            }
            TraversalDir::Backward => {
                let (parent_row, child_row) = ctx.state.topo.sink_rows(parent, child);
                fold_into(parent_row, child_row, fold_weight, max_weight);
            }
        }
    }

    fn traversal_done(&mut self, _ctx: &mut TraversalCtx<'_>) {}
}

/// Shifts the parent's bucket contents into the child at the child's fold
/// offset, dropping anything past the weight budget.
fn fold_into(parent: &[f32], child: &mut [f32], fold_weight: i32, max_weight: i32) {
    if fold_weight < 0 || fold_weight > max_weight {
        return;
    }
    let fw = fold_weight as usize;
    let maxw = max_weight as usize;
    for k in 0..=maxw - fw {
        if parent[k] != 0.0 {
            child[k + fw] += parent[k];
        }
    }
}

/// Convolution of a node's two bucket rows under the total-weight budget:
/// a source-side path of weight i and a sink-side path of weight j share the
/// node itself, so the combined weight is i + j - fold_weight.
pub fn paths_through_node(
    source_row: &[f32],
    sink_row: &[f32],
    fold_weight: i32,
    max_weight: i32,
) -> f64 {
    let mut total = 0.0f64;
    if max_weight < 0 {
        return total;
    }
    for (i, &count) in source_row.iter().enumerate().take(max_weight as usize + 1) {
        if count == 0.0 {
            continue;
        }
        let j_max = (max_weight + fold_weight - i as i32).min(max_weight);
        if j_max < 0 {
            continue;
        }
        let mut sink_sum = 0.0f64;
        for &s in sink_row.iter().take(j_max as usize + 1) {
            sink_sum += s as f64;
        }
        total += count as f64 * sink_sum;
    }
    total
}

/// Total number of enumerated source-to-sink paths, read off the source's
/// backward-filled sink buckets.
pub fn num_paths_from_source(
    arena: &TopoArena,
    source: RRNodeId,
    source_weight: i32,
    max_weight: i32,
) -> f64 {
    let limit = max_weight - source_weight;
    if limit < 0 {
        return 0.0;
    }
    arena
        .sink_buckets(source)
        .iter()
        .take(limit as usize + 1)
        .map(|&v| v as f64)
        .sum()
}
