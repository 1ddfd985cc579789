//! Recursive cutline reliability. Hop layers between source and sink are
//! subdivided at the tightest cut (fewest members); narrow spans are
//! evaluated directly and the pieces multiply back together.

use crate::error::AnalysisError;
use crate::models::cut_reliability;
use crate::traversal::{TraversalCallbacks, TraversalCtx};
use wotan_common::arch::BlockType;
use wotan_common::graph::{RRNodeId, RRNodeType};

pub struct CutlineRecursiveVisitor<'a> {
    /// Source-to-sink hop count bounding the layer indices.
    bound_source_hops: i32,
    source_ind: RRNodeId,
    sink_ind: RRNodeId,
    fill_type: Option<&'a BlockType>,
    /// Indexed by source hop count; index 0 (the source layer) stays empty.
    layers: Vec<Vec<RRNodeId>>,
    pub prob_routable: f32,
    pub error: Option<AnalysisError>,
}

impl<'a> CutlineRecursiveVisitor<'a> {
    pub fn new(
        source_ind: RRNodeId,
        sink_ind: RRNodeId,
        fill_type: Option<&'a BlockType>,
        bound_source_hops: i32,
    ) -> Self {
        Self {
            bound_source_hops,
            source_ind,
            sink_ind,
            fill_type,
            layers: vec![Vec::new(); bound_source_hops.max(0) as usize],
            prob_routable: 0.0,
            error: None,
        }
    }

    fn direct(&self, ctx: &TraversalCtx<'_>, layer: usize) -> Result<f64, AnalysisError> {
        if self.layers[layer].is_empty() {
            return Ok(1.0);
        }
        cut_reliability(
            ctx.graph,
            &self.layers[layer],
            self.source_ind,
            self.sink_ind,
            self.fill_type,
            ctx.opts,
        )
    }

    fn recurse(&self, ctx: &TraversalCtx<'_>, lo: usize, hi: usize) -> Result<f64, AnalysisError> {
        if lo >= hi {
            return Ok(1.0);
        }
        if hi - lo <= 2 {
            let mut prob = 1.0;
            for layer in lo..hi {
                prob *= self.direct(ctx, layer)?;
            }
            return Ok(prob);
        }
        // Split at the narrowest cut: it dominates the span's reliability.
        let pivot = (lo..hi)
            .min_by_key(|&l| self.layers[l].len())
            .unwrap_or(lo);
        let left = self.recurse(ctx, lo, pivot)?;
        let middle = self.direct(ctx, pivot)?;
        let right = self.recurse(ctx, pivot + 1, hi)?;
        Ok(left * middle * right)
    }
}

impl TraversalCallbacks for CutlineRecursiveVisitor<'_> {
    fn node_popped(&mut self, ctx: &mut TraversalCtx<'_>, node: RRNodeId) {
        if matches!(
            ctx.graph[node].rr_type,
            RRNodeType::Source | RRNodeType::Sink
        ) {
            return;
        }
        let hops = ctx.state.ss[node.index()].source_hops;
        if hops >= 1 && hops < self.bound_source_hops {
            self.layers[hops as usize].push(node);
        }
    }

    fn child_iterated(
        &mut self,
        _ctx: &mut TraversalCtx<'_>,
        _parent: RRNodeId,
        _child: RRNodeId,
    ) {
    }

    fn traversal_done(&mut self, ctx: &mut TraversalCtx<'_>) {
        let span = self.layers.len();
        match self.recurse(ctx, 1.min(span), span) {
            Ok(prob) => self.prob_routable = prob as f32,
            Err(e) => self.error = Some(e),
        }
    }
}
