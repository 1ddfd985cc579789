//! Analysis of a bare one-source/one-sink graph, for hand-built inputs that
//! do not model a full fabric.

use crate::conn::{enumerate_connection_paths, estimate_connection_probability};
use crate::error::AnalysisError;
use crate::models::enumerate::paths_through_node;
use crate::state::NodeState;
use wotan_common::graph::{RRGraph, RRNodeId, RRNodeType};
use wotan_common::util::config::UserOptions;

const SIMPLE_MAX_PATH_WEIGHT: i32 = 1000;

/// Enumerates all bounded paths between the graph's single source and sink,
/// prints per-node path counts, then estimates the connection probability.
pub fn analyze_simple_graph(graph: &RRGraph, opts: &UserOptions) -> Result<(), AnalysisError> {
    let (source, sink) = find_terminals(graph)?;

    let mut state = NodeState::new(graph.num_nodes(), SIMPLE_MAX_PATH_WEIGHT);

    enumerate_connection_paths(
        graph,
        &mut state,
        opts,
        source,
        sink,
        SIMPLE_MAX_PATH_WEIGHT,
        None,
    )?;

    println!("Node paths:");
    for id in graph.iter_ids() {
        let node = &graph[id];
        let paths = paths_through_node(
            state.topo.source_buckets(id),
            state.topo.sink_buckets(id),
            node.weight,
            SIMPLE_MAX_PATH_WEIGHT,
        );
        println!("{}: {}, {} paths", id.index(), node.rr_type.name(), paths);
    }

    state.clean_touched();

    let probability = estimate_connection_probability(
        graph,
        None,
        &mut state,
        opts,
        source,
        sink,
        SIMPLE_MAX_PATH_WEIGHT,
    )?;
    println!("Connection probability: {}", probability);

    Ok(())
}

/// The simple mode allows exactly one SOURCE and one SINK.
fn find_terminals(graph: &RRGraph) -> Result<(RRNodeId, RRNodeId), AnalysisError> {
    let mut source = None;
    let mut sink = None;
    for id in graph.iter_ids() {
        match graph[id].rr_type {
            RRNodeType::Source => {
                if source.replace(id).is_some() {
                    return Err(AnalysisError::graph(
                        "expected exactly one source node in a simple graph",
                    ));
                }
            }
            RRNodeType::Sink => {
                if sink.replace(id).is_some() {
                    return Err(AnalysisError::graph(
                        "expected exactly one sink node in a simple graph",
                    ));
                }
            }
            _ => {}
        }
    }
    match (source, sink) {
        (Some(s), Some(t)) => Ok((s, t)),
        _ => Err(AnalysisError::graph(
            "simple graph is missing a source or sink node",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_graphs::{chain_graph, diamond_graph};

    #[test]
    fn simple_analysis_runs_end_to_end() {
        let (graph, _s, _t) = chain_graph(&[1, 1]);
        let opts = UserOptions::default();
        analyze_simple_graph(&graph, &opts).unwrap();
    }

    #[test]
    fn rejects_extra_sources() {
        let (mut graph, _s, _t, _b, _c) = diamond_graph();
        use wotan_common::graph::RRNode;
        graph.add_node(RRNode::new(RRNodeType::Source, 3, 3, 3, 3));
        let opts = UserOptions::default();
        assert!(analyze_simple_graph(&graph, &opts).is_err());
    }
}
