pub mod cutline;
pub mod cutline_recursive;
pub mod cutline_simple;
pub mod enumerate;
pub mod propagate;
pub mod reliability_poly;

use crate::conn::adjusted_demand;
use crate::error::AnalysisError;
use wotan_common::arch::BlockType;
use wotan_common::graph::{RRGraph, RRNodeId};
use wotan_common::util::config::UserOptions;

/// Probability that a node is free of competing demand, adjusted for the
/// current connection's own enumeration contribution.
pub(crate) fn node_free_probability(
    graph: &RRGraph,
    node: RRNodeId,
    source: RRNodeId,
    sink: RRNodeId,
    fill_type: Option<&BlockType>,
    opts: &UserOptions,
) -> Result<f64, AnalysisError> {
    let demand = adjusted_demand(graph, node, source, sink, fill_type, opts)?;
    Ok((1.0 - demand).clamp(0.0, 1.0))
}

/// Union of two independent event probabilities.
#[inline]
pub(crate) fn probability_or(a: f32, b: f64) -> f32 {
    let a = a as f64;
    (a + b - a * b) as f32
}

/// Reliability of a single cut: the chance at least one member is free.
pub(crate) fn cut_reliability(
    graph: &RRGraph,
    nodes: &[RRNodeId],
    source: RRNodeId,
    sink: RRNodeId,
    fill_type: Option<&BlockType>,
    opts: &UserOptions,
) -> Result<f64, AnalysisError> {
    let mut all_blocked = 1.0f64;
    for &node in nodes {
        let p_free = node_free_probability(graph, node, source, sink, fill_type, opts)?;
        all_blocked *= 1.0 - p_free;
    }
    Ok(1.0 - all_blocked)
}
