//! Bidirectional bounded distance and hop passes. These prune the graph down
//! to nodes that could sit on a legal path before the topological traversal
//! runs.

use crate::error::AnalysisError;
use crate::pq::BoundedPriorityQueue;
use crate::state::{NodeState, UNDEFINED};
use std::collections::VecDeque;
use wotan_common::graph::{RRGraph, RRNode, RRNodeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraversalDir {
    /// Expand along out-edges, measuring from the source.
    Forward,
    /// Expand along in-edges, measuring from the sink.
    Backward,
}

/// Dijkstra from `from`, bounded by `max_path_weight`, recording per-node
/// distance from the traversal origin. A node's weight is added when the node
/// is first relaxed. Forward passes prune children that cannot geometrically
/// reach the destination tile in the remaining budget; backward passes
/// re-verify legality against the forward distances and un-mark failures so
/// later paths do not inherit stale state.
pub fn set_node_distances(
    graph: &RRGraph,
    state: &mut NodeState,
    from: RRNodeId,
    to: RRNodeId,
    max_path_weight: i32,
    dir: TraversalDir,
) -> Result<(), AnalysisError> {
    let dest = &graph[to];
    if dest.xlow != dest.xhigh || dest.ylow != dest.yhigh {
        return Err(AnalysisError::graph(format!(
            "destination node {:?} spans multiple tiles",
            to
        )));
    }
    let destx = dest.xlow;
    let desty = dest.ylow;

    let mut pq: BoundedPriorityQueue<RRNodeId> =
        BoundedPriorityQueue::new(max_path_weight.max(0) as usize);
    pq.push(from, 0);

    match dir {
        TraversalDir::Forward => {
            state.ss[from.index()].source_distance = 0;
            state.ss[from.index()].visited_from_source = true;
        }
        TraversalDir::Backward => {
            state.ss[from.index()].sink_distance = 0;
            state.ss[from.index()].visited_from_sink = true;
        }
    }

    while let Some((node, base_weight)) = pq.pop() {
        let edges = match dir {
            TraversalDir::Forward => &graph[node].out_edges,
            TraversalDir::Backward => &graph[node].in_edges,
        };

        for &child in edges {
            let ss = &state.ss[child.index()];
            let already = match dir {
                TraversalDir::Forward => ss.visited_from_source,
                TraversalDir::Backward => ss.visited_from_sink,
            };
            if already {
                continue;
            }

            let child_weight = graph[child].weight;
            let path_weight = base_weight as i32 + child_weight;

            match dir {
                TraversalDir::Forward => {
                    if !has_chance_to_reach(
                        &graph[child],
                        destx,
                        desty,
                        path_weight,
                        max_path_weight,
                    )? {
                        continue;
                    }
                    let ss = &mut state.ss[child.index()];
                    ss.source_distance = path_weight;
                    ss.visited_from_source = true;
                }
                TraversalDir::Backward => {
                    let ss = &mut state.ss[child.index()];
                    ss.sink_distance = path_weight;
                    ss.visited_from_sink = true;
                    if !ss.is_legal(child_weight, max_path_weight) {
                        ss.sink_distance = UNDEFINED;
                        ss.visited_from_sink = false;
                        continue;
                    }
                }
            }

            pq.push(child, path_weight as usize);
        }

        state.visited.push(node);
    }

    Ok(())
}

/// Lower-bounds the remaining path weight from a node's footprint to the
/// destination tile. The extra subtraction of 1 in the x-spanning overlap arm
/// has no y-spanning counterpart; the asymmetry matches established behavior
/// and is deliberately preserved.
fn has_chance_to_reach(
    node: &RRNode,
    destx: i32,
    desty: i32,
    node_path_weight: i32,
    max_path_weight: i32,
) -> Result<bool, AnalysisError> {
    let (x_diff, y_diff) = if node.xlow == node.xhigh {
        // Node spans in the y direction.
        if desty <= node.yhigh && desty >= node.ylow {
            ((destx - node.xlow).abs(), 0)
        } else if desty > node.yhigh {
            ((destx - node.xlow).abs(), desty - node.yhigh)
        } else {
            ((destx - node.xlow).abs(), node.ylow - desty)
        }
    } else if node.ylow == node.yhigh {
        // Node spans in the x direction.
        if destx <= node.xhigh && destx >= node.xlow {
            (0, (desty - node.ylow).abs() - 1)
        } else if destx > node.xhigh {
            (destx - node.xhigh, (desty - node.ylow).abs())
        } else {
            (node.xlow - destx, (desty - node.ylow).abs())
        }
    } else {
        return Err(AnalysisError::graph(
            "node has a span in both the x and y directions",
        ));
    };

    let remaining_lower_bound = (x_diff + y_diff - 1).max(0);
    Ok(node_path_weight + remaining_lower_bound <= max_path_weight)
}

/// Runs both distance passes and tightens the weight budget to
/// `min(max_path_weight, ceil(min_dist * flexibility))`. The two passes must
/// agree on the source-sink distance.
pub fn distances_and_tightened_weight(
    graph: &RRGraph,
    state: &mut NodeState,
    source: RRNodeId,
    sink: RRNodeId,
    max_path_weight: i32,
    flexibility: f64,
) -> Result<(i32, i32), AnalysisError> {
    set_node_distances(graph, state, source, sink, max_path_weight, TraversalDir::Forward)?;
    set_node_distances(graph, state, sink, source, max_path_weight, TraversalDir::Backward)?;

    let min_dist_sink = state.ss[sink.index()].source_distance;
    let min_dist_source = state.ss[source.index()].sink_distance;
    if min_dist_sink != min_dist_source {
        return Err(AnalysisError::graph(format!(
            "distance to source does not match distance to sink: {} vs {}",
            min_dist_source, min_dist_sink
        )));
    }

    let tightened = ((min_dist_sink as f64 * flexibility).ceil() as i32).min(max_path_weight);
    Ok((tightened, min_dist_sink))
}

/// BFS over the legal subgraph assigning each node its hop count from the
/// traversal origin. Uses its own visited flags so it composes with the
/// distance passes.
pub fn set_node_hops(
    graph: &RRGraph,
    state: &mut NodeState,
    from: RRNodeId,
    max_path_weight: i32,
    dir: TraversalDir,
) {
    let mut queue: VecDeque<RRNodeId> = VecDeque::new();
    queue.push_back(from);

    match dir {
        TraversalDir::Forward => {
            state.ss[from.index()].source_hops = 0;
            state.ss[from.index()].visited_from_source_hops = true;
        }
        TraversalDir::Backward => {
            state.ss[from.index()].sink_hops = 0;
            state.ss[from.index()].visited_from_sink_hops = true;
        }
    }

    while let Some(node) = queue.pop_front() {
        let node_hops = match dir {
            TraversalDir::Forward => state.ss[node.index()].source_hops,
            TraversalDir::Backward => state.ss[node.index()].sink_hops,
        };
        let edges = match dir {
            TraversalDir::Forward => &graph[node].out_edges,
            TraversalDir::Backward => &graph[node].in_edges,
        };

        for &child in edges {
            if !state.ss[child.index()].is_legal(graph[child].weight, max_path_weight) {
                continue;
            }
            let ss = &mut state.ss[child.index()];
            let already = match dir {
                TraversalDir::Forward => ss.visited_from_source_hops,
                TraversalDir::Backward => ss.visited_from_sink_hops,
            };
            if already {
                continue;
            }
            match dir {
                TraversalDir::Forward => {
                    ss.visited_from_source_hops = true;
                    ss.source_hops = node_hops + 1;
                }
                TraversalDir::Backward => {
                    ss.visited_from_sink_hops = true;
                    ss.sink_hops = node_hops + 1;
                }
            }
            queue.push_back(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_graphs::{chain_graph, diamond_graph, grid_channel_graph};

    #[test]
    fn forward_and_backward_distances_agree() {
        let (graph, source, sink) = chain_graph(&[1, 1, 1]);
        let mut state = NodeState::new(graph.num_nodes(), 10);
        let (w, dist) =
            distances_and_tightened_weight(&graph, &mut state, source, sink, 10, 1.3).unwrap();
        assert_eq!(dist, 3);
        assert_eq!(w, 4); // ceil(3 * 1.3)
        assert_eq!(state.ss[sink.index()].source_distance, 3);
        assert_eq!(state.ss[source.index()].sink_distance, 3);
    }

    #[test]
    fn unreachable_pair_reports_undefined() {
        let (graph, source, sink) = chain_graph(&[1]);
        // Sever the path by bounding the weight below the only path.
        let mut state = NodeState::new(graph.num_nodes(), 10);
        let (w, dist) =
            distances_and_tightened_weight(&graph, &mut state, source, sink, 0, 1.3).unwrap();
        assert_eq!(dist, UNDEFINED);
        assert!(w <= 0);
    }

    #[test]
    fn diamond_marks_both_branches_legal() {
        let (graph, source, sink, b, c) = diamond_graph();
        let mut state = NodeState::new(graph.num_nodes(), 3);
        let (w, _) =
            distances_and_tightened_weight(&graph, &mut state, source, sink, 3, 1.3).unwrap();
        assert!(state.ss[b.index()].is_legal(graph[b].weight, w));
        assert!(state.ss[c.index()].is_legal(graph[c].weight, w));
    }

    #[test]
    fn geometric_prune_bounds_touched_nodes() {
        // 30x1 channel chain, source at x=5, sink at x=20, budget 5: only
        // nodes within weight 5 of the source that can still reach x=20 are
        // touched, which is none past the immediate neighborhood.
        let (graph, source, sink) = grid_channel_graph(30, 5, 20);
        let mut state = NodeState::new(graph.num_nodes(), 5);
        set_node_distances(&graph, &mut state, source, sink, 5, TraversalDir::Forward).unwrap();
        // Only the source itself survives: every forward step still leaves
        // more than the remaining budget of distance to cover.
        assert!(state.visited.len() <= 2);
    }

    #[test]
    fn hops_follow_legal_subgraph() {
        let (graph, source, sink) = chain_graph(&[1, 1]);
        let mut state = NodeState::new(graph.num_nodes(), 10);
        distances_and_tightened_weight(&graph, &mut state, source, sink, 10, 2.0).unwrap();
        set_node_hops(&graph, &mut state, source, 10, TraversalDir::Forward);
        set_node_hops(&graph, &mut state, sink, 10, TraversalDir::Backward);
        assert_eq!(state.ss[sink.index()].source_hops, 3);
        assert_eq!(state.ss[source.index()].sink_hops, 3);
    }

    #[test]
    fn cleanup_resets_visited_nodes() {
        let (graph, source, sink) = chain_graph(&[2, 2]);
        let mut state = NodeState::new(graph.num_nodes(), 20);
        distances_and_tightened_weight(&graph, &mut state, source, sink, 20, 1.3).unwrap();
        assert!(!state.visited.is_empty());
        state.clean_touched();
        for id in graph.iter_ids() {
            assert!(!state.ss[id.index()].any_visited());
        }
    }
}
