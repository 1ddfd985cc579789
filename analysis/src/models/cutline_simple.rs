//! Cutline reliability over BFS hop layers. Layers are pre-sized from the
//! source-to-sink hop count; member node ids are collected during the
//! traversal and the reliability is evaluated once at the end.

use crate::error::AnalysisError;
use crate::models::cut_reliability;
use crate::traversal::{TraversalCallbacks, TraversalCtx};
use wotan_common::arch::BlockType;
use wotan_common::graph::{RRNodeId, RRNodeType};

pub struct CutlineSimpleVisitor<'a> {
    source: RRNodeId,
    sink: RRNodeId,
    fill_type: Option<&'a BlockType>,
    /// One entry per hop layer strictly between source and sink.
    layers: Vec<Vec<RRNodeId>>,
    pub prob_routable: f32,
    pub error: Option<AnalysisError>,
}

impl<'a> CutlineSimpleVisitor<'a> {
    pub fn new(
        source: RRNodeId,
        sink: RRNodeId,
        fill_type: Option<&'a BlockType>,
        num_layers: usize,
    ) -> Self {
        Self {
            source,
            sink,
            fill_type,
            layers: vec![Vec::new(); num_layers],
            prob_routable: 0.0,
            error: None,
        }
    }
}

impl TraversalCallbacks for CutlineSimpleVisitor<'_> {
    fn node_popped(&mut self, ctx: &mut TraversalCtx<'_>, node: RRNodeId) {
        if matches!(
            ctx.graph[node].rr_type,
            RRNodeType::Source | RRNodeType::Sink
        ) {
            return;
        }
        let hops = ctx.state.ss[node.index()].source_hops;
        if hops >= 1 && (hops as usize) <= self.layers.len() {
            self.layers[hops as usize - 1].push(node);
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
        let mut prob = 1.0f64;
        for layer in &self.layers {
            if layer.is_empty() {
                continue;
            }
            match cut_reliability(
                ctx.graph,
                layer,
                self.source,
                self.sink,
                self.fill_type,
                ctx.opts,
            ) {
                Ok(r) => prob *= r,
                Err(e) => {
                    self.error = Some(e);
                    return;
                }
            }
        }
        self.prob_routable = prob as f32;
    }
}
