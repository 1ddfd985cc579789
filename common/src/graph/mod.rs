pub mod ids;
pub mod node;
pub mod parser;

pub use ids::RRNodeId;
pub use node::{RRNode, RRNodeType};

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

/// The routing resource graph. Structure is immutable once built; only the
/// per-node demand and path-count history change during analysis.
pub struct RRGraph {
    pub nodes: Vec<RRNode>,
    lookup: HashMap<(RRNodeType, i32, i32, i32), RRNodeId>,
}

impl RRGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Adds a node and registers it in the (type, x, y, ptc) lookup.
    pub fn add_node(&mut self, node: RRNode) -> RRNodeId {
        let id = RRNodeId::new(self.nodes.len());
        self.lookup
            .insert((node.rr_type, node.xlow, node.ylow, node.ptc), id);
        self.nodes.push(node);
        id
    }

    /// Adds a node without a lookup entry. Used for the synthetic sources
    /// attached to IPINs, which live outside the pin/class index space.
    pub fn add_unindexed_node(&mut self, node: RRNode) -> RRNodeId {
        let id = RRNodeId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn add_edge(&mut self, from: RRNodeId, to: RRNodeId) {
        self.nodes[from.index()].out_edges.push(to);
        self.nodes[to.index()].in_edges.push(from);
    }

    pub fn node_index(&self, rr_type: RRNodeType, x: i32, y: i32, ptc: i32) -> Option<RRNodeId> {
        self.lookup.get(&(rr_type, x, y, ptc)).copied()
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = RRNodeId> + '_ {
        (0..self.nodes.len()).map(RRNodeId::new)
    }
}

impl Default for RRGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<RRNodeId> for RRGraph {
    type Output = RRNode;

    #[inline(always)]
    fn index(&self, id: RRNodeId) -> &RRNode {
        &self.nodes[id.index()]
    }
}

impl IndexMut<RRNodeId> for RRGraph {
    #[inline(always)]
    fn index_mut(&mut self, id: RRNodeId) -> &mut RRNode {
        &mut self.nodes[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_edge_updates_both_lists() {
        let mut g = RRGraph::new();
        let a = g.add_node(RRNode::new(RRNodeType::Source, 1, 1, 1, 1));
        let b = g.add_node(RRNode::new(RRNodeType::Chanx, 1, 1, 1, 1));
        g.add_edge(a, b);
        assert_eq!(g[a].out_edges, vec![b]);
        assert_eq!(g[b].in_edges, vec![a]);
        assert!(g[a].in_edges.is_empty());
    }

    #[test]
    fn lookup_by_type_coord_ptc() {
        let mut g = RRGraph::new();
        let mut n = RRNode::new(RRNodeType::Sink, 2, 3, 2, 3);
        n.ptc = 1;
        let id = g.add_node(n);
        assert_eq!(g.node_index(RRNodeType::Sink, 2, 3, 1), Some(id));
        assert_eq!(g.node_index(RRNodeType::Sink, 2, 3, 0), None);
        assert_eq!(g.node_index(RRNodeType::Source, 2, 3, 1), None);
    }

    #[test]
    fn unindexed_nodes_stay_out_of_lookup() {
        let mut g = RRGraph::new();
        let id = g.add_unindexed_node(RRNode::new(RRNodeType::Source, 1, 1, 1, 1));
        assert_eq!(g.node_index(RRNodeType::Source, 1, 1, 0), None);
        assert_eq!(g[id].rr_type, RRNodeType::Source);
    }
}
