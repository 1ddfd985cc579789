//! Shared analysis results and the global routability metrics.

use crate::error::AnalysisError;
use crate::pq::{FixedSizePq, Greater, Less};
use rayon::prelude::*;
use std::sync::Mutex;
use wotan_common::graph::RRGraph;
use wotan_common::util::config::UserOptions;

/// Fraction of worst per-length connection probabilities retained for the
/// pessimistic metric.
pub const WORST_ROUTABILITY_PERCENTILE: f64 = 0.10;
/// Fraction of highest routing-node demands averaged for the demand metric.
pub const WORST_NODE_DEMAND_PERCENTILE: f64 = 0.05;

struct ResultsInner {
    total_prob: f64,
    max_possible_total_prob: f64,
    desired_conns: u64,
    num_conns: u64,
    lowest_probs_pqs: Vec<FixedSizePq<f32, Less>>,
}

/// Process-wide accumulation of analysis results. Workers add under a single
/// mutex held only for short increments and pushes.
pub struct AnalysisResults {
    inner: Mutex<ResultsInner>,
}

impl AnalysisResults {
    /// `conns_at_length[len]` sizes the per-length worst-probability queues.
    pub fn new(max_connection_length: i32, conns_at_length: &[usize]) -> Self {
        let mut pqs = Vec::with_capacity(max_connection_length as usize + 1);
        for len in 0..=max_connection_length as usize {
            let conns = conns_at_length.get(len).copied().unwrap_or(0);
            let limit = (conns as f64 * WORST_ROUTABILITY_PERCENTILE).ceil() as usize;
            pqs.push(FixedSizePq::new(limit));
        }
        Self {
            inner: Mutex::new(ResultsInner {
                total_prob: 0.0,
                max_possible_total_prob: 0.0,
                desired_conns: 0,
                num_conns: 0,
                lowest_probs_pqs: pqs,
            }),
        }
    }

    pub fn increment_desired(&self) {
        self.inner.lock().unwrap().desired_conns += 1;
    }

    pub fn increment_num_conns(&self) {
        self.inner.lock().unwrap().num_conns += 1;
    }

    /// Adds one connection's weighted probability. The per-pin share lands in
    /// the worst-probability queue once per (sub-source, sub-sink) pair, and
    /// the connection's ideal weight raises the normalization ceiling.
    pub fn add_probability(
        &self,
        increment: f64,
        scaling: f64,
        conn_length: i32,
        num_subsources: usize,
        num_subsinks: usize,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_prob += increment;
        inner.max_possible_total_prob += scaling;

        let div_factor = (num_subsources * num_subsinks).max(1);
        let push_value = (increment / div_factor as f64) as f32;
        if let Some(pq) = inner.lowest_probs_pqs.get_mut(conn_length as usize) {
            for _ in 0..div_factor {
                pq.push(push_value);
            }
        }
    }

    pub fn totals(&self) -> (f64, f64, u64, u64) {
        let inner = self.inner.lock().unwrap();
        (
            inner.total_prob,
            inner.max_possible_total_prob,
            inner.desired_conns,
            inner.num_conns,
        )
    }

    /// Sum of every retained worst-case entry across lengths. Drains the
    /// queues; call once after the probability phase.
    pub fn pessimistic_sum(&self) -> f64 {
        let mut inner = self.inner.lock().unwrap();
        let mut sum = 0.0f64;
        for pq in &mut inner.lowest_probs_pqs {
            while let Some(entry) = pq.pop() {
                sum += entry as f64;
            }
        }
        sum
    }
}

/// Total and squared demand over channel nodes.
pub fn demand_totals(graph: &RRGraph, opts: &UserOptions) -> (f64, f64, usize) {
    graph
        .nodes
        .par_iter()
        .filter(|n| n.rr_type.is_channel())
        .map(|n| {
            let demand = n.demand(opts);
            (demand, demand * demand, 1usize)
        })
        .reduce(
            || (0.0, 0.0, 0),
            |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2),
        )
}

/// Average demand over the top few percent most-demanded channel nodes.
pub fn node_demand_metric(graph: &RRGraph, opts: &UserOptions) -> Result<f64, AnalysisError> {
    let num_routing_nodes = graph
        .nodes
        .par_iter()
        .filter(|n| n.rr_type.is_channel())
        .count();
    let limit = (num_routing_nodes as f64 * WORST_NODE_DEMAND_PERCENTILE).ceil() as usize;
    if limit == 0 {
        return Err(AnalysisError::config(
            "demand metric needs at least one routing node",
        ));
    }

    let mut worst: FixedSizePq<f64, Greater> = FixedSizePq::new(limit);
    for node in &graph.nodes {
        if node.rr_type.is_channel() {
            worst.push(node.demand(opts));
        }
    }

    let count = worst.size();
    let mut sum = 0.0;
    while let Some(demand) = worst.pop() {
        sum += demand;
    }
    Ok(sum / count as f64)
}
