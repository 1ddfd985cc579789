//! Per-connection orchestration: scaling factors, enumeration, probability
//! estimation, and state cleanup.

use crate::distances::{TraversalDir, distances_and_tightened_weight, set_node_hops};
use crate::error::AnalysisError;
use crate::metrics::AnalysisResults;
use crate::models::cutline::CutlineVisitor;
use crate::models::cutline_recursive::CutlineRecursiveVisitor;
use crate::models::cutline_simple::CutlineSimpleVisitor;
use crate::models::enumerate::{
    EnumerateMode, EnumerateVisitor, num_paths_from_source,
};
use crate::models::propagate::PropagateVisitor;
use crate::models::reliability_poly::analyze_reliability_polynomial;
use crate::state::NodeState;
use crate::traversal::do_topological_traversal;
use wotan_common::arch::{ArchStructs, BlockType};
use wotan_common::graph::{RRGraph, RRNodeId, RRNodeType};
use wotan_common::util::config::{ProbabilityMode, UserOptions};
use wotan_common::util::settings::AnalysisSettings;

const PROBS_EQUAL_EPSILON: f32 = 1e-6;
const DEMAND_ADJUST_EPSILON: f64 = 1e-5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopologicalMode {
    /// Count paths and write node demands.
    Enumerate,
    /// Read node demands and estimate routing probabilities.
    Probability,
}

/// Sum and single-pin value of the pin probabilities a source node stands
/// for. Pins of one class must carry equal probabilities.
pub fn source_probabilities(
    graph: &RRGraph,
    source: RRNodeId,
    pin_probs: &[f32],
    fill_type: &BlockType,
) -> Result<(f32, f32), AnalysisError> {
    let node = &graph[source];
    match node.rr_type {
        RRNodeType::Source => {
            let class = fill_type.classes.get(node.ptc as usize).ok_or_else(|| {
                AnalysisError::graph(format!(
                    "source node {:?} references missing pin class {}",
                    source, node.ptc
                ))
            })?;
            let mut sum = 0.0f32;
            let mut one_pin = 0.0f32;
            for (i, &pin) in class.pins.iter().enumerate() {
                let prob = *pin_probs.get(pin).ok_or_else(|| {
                    AnalysisError::graph(format!("pin {} has no probability entry", pin))
                })?;
                if i == 0 {
                    one_pin = prob;
                } else if (one_pin - prob).abs() > PROBS_EQUAL_EPSILON {
                    return Err(AnalysisError::graph(format!(
                        "pins of one class carry unequal probabilities: {} vs {}",
                        one_pin, prob
                    )));
                }
                sum += prob;
            }
            Ok((sum, one_pin))
        }
        RRNodeType::Ipin => {
            let prob = *pin_probs.get(node.ptc as usize).ok_or_else(|| {
                AnalysisError::graph(format!("ipin ptc {} has no probability entry", node.ptc))
            })?;
            Ok((prob, prob))
        }
        other => Err(AnalysisError::graph(format!(
            "cannot take source probabilities of a {} node",
            other.name()
        ))),
    }
}

/// Number of physical sinks a super-sink stands for.
pub fn sinks_in_super_sink(
    graph: &RRGraph,
    sink: RRNodeId,
    fill_type: &BlockType,
) -> Result<usize, AnalysisError> {
    let node = &graph[sink];
    if node.rr_type != RRNodeType::Sink {
        return Err(AnalysisError::graph(format!(
            "expected a SINK node, got {}",
            node.rr_type.name()
        )));
    }
    fill_type
        .classes
        .get(node.ptc as usize)
        .map(|c| c.pins.len())
        .ok_or_else(|| {
            AnalysisError::graph(format!("sink node {:?} references missing class", sink))
        })
}

/// Number of physical sources a super-source stands for.
pub fn sources_in_super_source(
    graph: &RRGraph,
    source: RRNodeId,
    fill_type: &BlockType,
) -> Result<usize, AnalysisError> {
    let node = &graph[source];
    if node.rr_type != RRNodeType::Source {
        return Err(AnalysisError::graph(format!(
            "expected a SOURCE node, got {}",
            node.rr_type.name()
        )));
    }
    fill_type
        .classes
        .get(node.ptc as usize)
        .map(|c| c.pins.len())
        .ok_or_else(|| {
            AnalysisError::graph(format!("source node {:?} references missing class", source))
        })
}

fn endpoint_pin_count(graph: &RRGraph, endpoint: RRNodeId, fill_type: &BlockType) -> usize {
    fill_type
        .classes
        .get(graph[endpoint].ptc as usize)
        .map(|c| c.pins.len())
        .filter(|&n| n > 0)
        .unwrap_or(1)
}

/// A node's demand less what the current connection's own enumeration added,
/// so a pair does not compete with itself.
pub fn adjusted_demand(
    graph: &RRGraph,
    node: RRNodeId,
    source: RRNodeId,
    sink: RRNodeId,
    fill_type: Option<&BlockType>,
    opts: &UserOptions,
) -> Result<f64, AnalysisError> {
    let mut demand = graph[node].demand(opts);

    if let Some(fill) = fill_type {
        let num_source_pins = endpoint_pin_count(graph, source, fill) as f64;
        let num_sink_pins = endpoint_pin_count(graph, sink, fill) as f64;
        let source_contribution = graph[node].path_count_history(source) / num_source_pins;
        let sink_contribution = graph[node].path_count_history(sink) / num_sink_pins;
        let modifier = source_contribution.max(sink_contribution).max(0.0);

        if modifier > demand + DEMAND_ADJUST_EPSILON {
            return Err(AnalysisError::graph(format!(
                "history adjustment {} exceeds node demand {}",
                modifier, demand
            )));
        }
        demand = (demand - modifier).max(0.0);
    }

    Ok(demand)
}

/// Two traversals: backward from the sink to fill sink-side buckets, then
/// forward from the source with a scaled seed so the demand written to each
/// node reflects this connection's weighted share.
pub fn enumerate_connection_paths(
    graph: &RRGraph,
    state: &mut NodeState,
    opts: &UserOptions,
    source: RRNodeId,
    sink: RRNodeId,
    max_path_weight: i32,
    scaling: Option<f64>,
) -> Result<(), AnalysisError> {
    let (weight_budget, min_dist) = distances_and_tightened_weight(
        graph,
        state,
        source,
        sink,
        max_path_weight,
        opts.path_flexibility_factor,
    )?;

    if weight_budget <= 0 || min_dist <= 0 {
        return Ok(());
    }

    let mut visitor = EnumerateVisitor::new(EnumerateMode::ByPathWeight, source, sink);

    state.mark_topo_visited(sink);
    state.topo.sink_buckets_mut(sink)[0] = 1.0;
    do_topological_traversal(
        graph,
        state,
        opts,
        TraversalDir::Backward,
        sink,
        source,
        weight_budget,
        &mut visitor,
    );

    let num_paths = num_paths_from_source(&state.topo, source, graph[source].weight, weight_budget);
    let scaled_start = if num_paths > 0.0 {
        match scaling {
            Some(factor) => factor / num_paths,
            None => 1.0,
        }
    } else {
        0.0
    };

    visitor.num_routing_nodes_in_subgraph = 0;
    state.mark_topo_visited(source);
    state.topo.source_buckets_mut(source)[0] = scaled_start as f32;
    do_topological_traversal(
        graph,
        state,
        opts,
        TraversalDir::Forward,
        source,
        sink,
        weight_budget,
        &mut visitor,
    );

    Ok(())
}

/// Estimates P(sink reachable) for one connection under the configured
/// probability model. Always in [0, 1] or the run dies.
pub fn estimate_connection_probability(
    graph: &RRGraph,
    fill_type: Option<&BlockType>,
    state: &mut NodeState,
    opts: &UserOptions,
    source: RRNodeId,
    sink: RRNodeId,
    max_path_weight: i32,
) -> Result<f32, AnalysisError> {
    let (weight_budget, min_dist) = distances_and_tightened_weight(
        graph,
        state,
        source,
        sink,
        max_path_weight,
        opts.path_flexibility_factor,
    )?;

    if weight_budget <= 0 || min_dist <= 0 {
        return Ok(0.0);
    }

    let prob = match opts.probability_mode {
        ProbabilityMode::Propagate => {
            state.mark_topo_visited(source);
            state.topo.source_buckets_mut(source)[0] = 1.0;
            let mut visitor = PropagateVisitor::new(source, sink, fill_type);
            do_topological_traversal(
                graph,
                state,
                opts,
                TraversalDir::Forward,
                source,
                sink,
                weight_budget,
                &mut visitor,
            );
            if let Some(e) = visitor.error.take() {
                return Err(e);
            }
            visitor.prob_routable
        }
        ProbabilityMode::Cutline => {
            state.mark_topo_visited(source);
            state.topo.level[source.index()] = 0;
            let mut visitor = CutlineVisitor::new(source, sink, fill_type);
            do_topological_traversal(
                graph,
                state,
                opts,
                TraversalDir::Forward,
                source,
                sink,
                weight_budget,
                &mut visitor,
            );
            if let Some(e) = visitor.error.take() {
                return Err(e);
            }
            visitor.prob_routable
        }
        ProbabilityMode::CutlineSimple => {
            set_node_hops(graph, state, source, weight_budget, TraversalDir::Forward);
            set_node_hops(graph, state, sink, weight_budget, TraversalDir::Backward);
            let source_sink_hops = state.ss[source.index()].sink_hops;
            let num_layers = (source_sink_hops - 1).max(0) as usize;
            let mut visitor = CutlineSimpleVisitor::new(source, sink, fill_type, num_layers);
            do_topological_traversal(
                graph,
                state,
                opts,
                TraversalDir::Forward,
                source,
                sink,
                weight_budget,
                &mut visitor,
            );
            if let Some(e) = visitor.error.take() {
                return Err(e);
            }
            visitor.prob_routable
        }
        ProbabilityMode::CutlineRecursive => {
            set_node_hops(graph, state, source, weight_budget, TraversalDir::Forward);
            set_node_hops(graph, state, sink, weight_budget, TraversalDir::Backward);
            let bound_source_hops = state.ss[sink.index()].source_hops;
            let mut visitor =
                CutlineRecursiveVisitor::new(source, sink, fill_type, bound_source_hops);
            do_topological_traversal(
                graph,
                state,
                opts,
                TraversalDir::Forward,
                source,
                sink,
                weight_budget,
                &mut visitor,
            );
            if let Some(e) = visitor.error.take() {
                return Err(e);
            }
            visitor.prob_routable
        }
        ProbabilityMode::ReliabilityPolynomial => {
            let fixed_demand = opts.use_routing_node_demand.ok_or_else(|| {
                AnalysisError::config(
                    "reliability polynomial mode requires use_routing_node_demand",
                )
            })?;
            set_node_hops(graph, state, source, weight_budget, TraversalDir::Forward);
            set_node_hops(graph, state, sink, weight_budget, TraversalDir::Backward);

            let mut visitor = EnumerateVisitor::new(EnumerateMode::ByPathHops, source, sink);
            state.mark_topo_visited(source);
            state.topo.source_buckets_mut(source)[0] = 1.0;
            do_topological_traversal(
                graph,
                state,
                opts,
                TraversalDir::Forward,
                source,
                sink,
                weight_budget,
                &mut visitor,
            );

            analyze_reliability_polynomial(
                state.topo.source_buckets(sink),
                visitor.num_routing_nodes_in_subgraph,
                1.0 - fixed_demand,
            ) as f32
        }
    };

    if prob > 1.0 {
        return Err(AnalysisError::numerical(format!(
            "connection probability {} above 1",
            prob
        )));
    }
    if prob < 0.0 {
        return Err(AnalysisError::numerical(format!(
            "connection probability {} below 0",
            prob
        )));
    }
    Ok(prob)
}

/// Analyzes one (source, sink) pair: derives scaling from the pin classes,
/// resolves IPIN sources to their attached synthetic source, dispatches to
/// the requested phase, pushes metrics, and cleans the touched state.
#[allow(clippy::too_many_arguments)]
pub fn analyze_connection(
    graph: &RRGraph,
    arch: &ArchStructs,
    settings: &AnalysisSettings,
    state: &mut NodeState,
    results: &AnalysisResults,
    source: RRNodeId,
    sink: RRNodeId,
    conn_length: i32,
    num_conns_at_length: usize,
    mode: TopologicalMode,
    opts: &UserOptions,
) -> Result<(), AnalysisError> {
    let fill_type = arch
        .fill_type()
        .ok_or_else(|| AnalysisError::config("fabric analysis requires a fill block type"))?;

    let length_prob = settings
        .length_probabilities
        .get(conn_length as usize)
        .copied()
        .unwrap_or(0.0);

    let (sum_source_probs, _one_pin_prob) =
        source_probabilities(graph, source, &settings.pin_probabilities, fill_type)?;
    let num_sinks = sinks_in_super_sink(graph, sink, fill_type)?;

    let (enum_source, num_sources) = if graph[source].rr_type == RRNodeType::Ipin {
        let synthetic = graph[source].ipin_source.ok_or_else(|| {
            AnalysisError::graph(format!("ipin {:?} has no attached source node", source))
        })?;
        (synthetic, 1)
    } else {
        (source, sources_in_super_source(graph, source, fill_type)?)
    };

    if num_conns_at_length == 0 {
        return Err(AnalysisError::graph(format!(
            "no connections recorded at length {}",
            conn_length
        )));
    }

    let max_path_weight = settings.max_path_weight(conn_length);

    let outcome = match mode {
        TopologicalMode::Enumerate => {
            let scaling = num_sinks as f64 * sum_source_probs as f64 * length_prob as f64
                / num_conns_at_length as f64;
            enumerate_connection_paths(
                graph,
                state,
                opts,
                enum_source,
                sink,
                max_path_weight,
                Some(scaling),
            )
            .map(|()| results.increment_num_conns())
        }
        TopologicalMode::Probability => estimate_connection_probability(
            graph,
            Some(fill_type),
            state,
            opts,
            enum_source,
            sink,
            max_path_weight,
        )
        .map(|prob| {
            let scaling = num_sinks as f64 * num_sources as f64 * length_prob as f64
                / num_conns_at_length as f64;
            results.add_probability(
                scaling * prob as f64,
                scaling,
                conn_length,
                num_sources,
                num_sinks,
            );
        }),
    };

    state.clean_touched();
    outcome
}
