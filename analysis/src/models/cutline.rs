//! Cutline reliability over traversal levels. Every popped node joins the cut
//! at its level (the longest parent chain seen so far); the connection
//! succeeds only if every level offers at least one free node.

use crate::error::AnalysisError;
use crate::models::node_free_probability;
use crate::traversal::{TraversalCallbacks, TraversalCtx};
use wotan_common::arch::BlockType;
use wotan_common::graph::{RRNodeId, RRNodeType};

pub struct CutlineVisitor<'a> {
    source: RRNodeId,
    sink: RRNodeId,
    fill_type: Option<&'a BlockType>,
    /// Per level: product of (1 - P(free)) over members.
    level_blocked: Vec<f64>,
    level_populated: Vec<bool>,
    pub prob_routable: f32,
    pub error: Option<AnalysisError>,
}

impl<'a> CutlineVisitor<'a> {
    pub fn new(source: RRNodeId, sink: RRNodeId, fill_type: Option<&'a BlockType>) -> Self {
        Self {
            source,
            sink,
            fill_type,
            level_blocked: Vec::new(),
            level_populated: Vec::new(),
            prob_routable: 0.0,
            error: None,
        }
    }
}

impl TraversalCallbacks for CutlineVisitor<'_> {
    fn node_popped(&mut self, ctx: &mut TraversalCtx<'_>, node: RRNodeId) {
        if self.error.is_some() {
            return;
        }
        if matches!(
            ctx.graph[node].rr_type,
            RRNodeType::Source | RRNodeType::Sink
        ) {
            return;
        }
        let level = ctx.state.topo.level[node.index()];
        if level < 0 {
            return;
        }
        let level = level as usize;
        if level >= self.level_blocked.len() {
            self.level_blocked.resize(level + 1, 1.0);
            self.level_populated.resize(level + 1, false);
        }
        match node_free_probability(
            ctx.graph,
            node,
            self.source,
            self.sink,
            self.fill_type,
            ctx.opts,
        ) {
            Ok(p_free) => {
                self.level_blocked[level] *= 1.0 - p_free;
                self.level_populated[level] = true;
            }
            Err(e) => self.error = Some(e),
        }
    }

    fn child_iterated(&mut self, ctx: &mut TraversalCtx<'_>, parent: RRNodeId, child: RRNodeId) {
        let parent_level = ctx.state.topo.level[parent.index()];
        let child_level = &mut ctx.state.topo.level[child.index()];
        *child_level = (*child_level).max(parent_level + 1);
    }

    fn traversal_done(&mut self, _ctx: &mut TraversalCtx<'_>) {
        if self.error.is_some() {
            return;
        }
        let mut prob = 1.0f64;
        for (level, &blocked) in self.level_blocked.iter().enumerate() {
            if self.level_populated[level] {
                prob *= 1.0 - blocked;
            }
        }
        self.prob_routable = prob as f32;
    }
}
