use crate::graph::ids::RRNodeId;
use crate::util::config::UserOptions;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RRNodeType {
    Source,
    Sink,
    Ipin,
    Opin,
    Chanx,
    Chany,
}

impl RRNodeType {
    pub fn is_channel(&self) -> bool {
        matches!(self, RRNodeType::Chanx | RRNodeType::Chany)
    }

    pub fn name(&self) -> &'static str {
        match self {
            RRNodeType::Source => "SOURCE",
            RRNodeType::Sink => "SINK",
            RRNodeType::Ipin => "IPIN",
            RRNodeType::Opin => "OPIN",
            RRNodeType::Chanx => "CHANX",
            RRNodeType::Chany => "CHANY",
        }
    }
}

impl FromStr for RRNodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOURCE" => Ok(RRNodeType::Source),
            "SINK" => Ok(RRNodeType::Sink),
            "IPIN" => Ok(RRNodeType::Ipin),
            "OPIN" => Ok(RRNodeType::Opin),
            "CHANX" => Ok(RRNodeType::Chanx),
            "CHANY" => Ok(RRNodeType::Chany),
            other => Err(format!("unknown rr node type '{}'", other)),
        }
    }
}

/// f64 with atomic add, stored as raw bits. Demand updates may cross worker
/// threads during enumeration and must not tear.
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn add(&self, v: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + v).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

pub struct RRNode {
    pub rr_type: RRNodeType,
    pub xlow: i32,
    pub ylow: i32,
    pub xhigh: i32,
    pub yhigh: i32,
    /// Pin index or class index within the owning tile's block type.
    pub ptc: i32,
    pub weight: i32,
    pub in_edges: Vec<RRNodeId>,
    pub out_edges: Vec<RRNodeId>,
    /// Synthetic source attached to an IPIN so fanout can be enumerated
    /// starting at the IPIN's driving channel nodes.
    pub ipin_source: Option<RRNodeId>,

    demand: AtomicF64,
    path_count_history: Mutex<HashMap<u32, f64>>,
}

impl RRNode {
    pub fn new(rr_type: RRNodeType, xlow: i32, ylow: i32, xhigh: i32, yhigh: i32) -> Self {
        Self {
            rr_type,
            xlow,
            ylow,
            xhigh,
            yhigh,
            ptc: 0,
            weight: 0,
            in_edges: Vec::new(),
            out_edges: Vec::new(),
            ipin_source: None,
            demand: AtomicF64::new(0.0),
            path_count_history: Mutex::new(HashMap::new()),
        }
    }

    /// Effective demand under the given options. A fixed routing-node demand,
    /// when configured, overrides the accumulated value on channel nodes.
    pub fn demand(&self, opts: &UserOptions) -> f64 {
        if let Some(fixed) = opts.use_routing_node_demand
            && self.rr_type.is_channel()
        {
            return fixed;
        }
        self.demand.load() * opts.demand_multiplier
    }

    pub fn raw_demand(&self) -> f64 {
        self.demand.load()
    }

    pub fn add_demand(&self, amount: f64) {
        self.demand.add(amount);
    }

    /// Path count contributed by enumerations that started or ended at the
    /// given endpoint node. Zero if no history was kept.
    pub fn path_count_history(&self, endpoint: RRNodeId) -> f64 {
        self.path_count_history
            .lock()
            .unwrap()
            .get(&endpoint.0)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn add_path_count_history(&self, endpoint: RRNodeId, amount: f64) {
        *self
            .path_count_history
            .lock()
            .unwrap()
            .entry(endpoint.0)
            .or_insert(0.0) += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_f64_accumulates() {
        let d = AtomicF64::new(0.0);
        d.add(0.25);
        d.add(0.5);
        assert!((d.load() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn node_type_round_trips() {
        for t in [
            RRNodeType::Source,
            RRNodeType::Sink,
            RRNodeType::Ipin,
            RRNodeType::Opin,
            RRNodeType::Chanx,
            RRNodeType::Chany,
        ] {
            assert_eq!(t.name().parse::<RRNodeType>().unwrap(), t);
        }
        assert!("WIRE".parse::<RRNodeType>().is_err());
    }

    #[test]
    fn fixed_demand_overrides_channels_only() {
        let opts = UserOptions {
            use_routing_node_demand: Some(0.3),
            ..UserOptions::default()
        };
        let chan = RRNode::new(RRNodeType::Chanx, 1, 1, 1, 1);
        chan.add_demand(5.0);
        assert!((chan.demand(&opts) - 0.3).abs() < 1e-12);

        let pin = RRNode::new(RRNodeType::Ipin, 1, 1, 1, 1);
        pin.add_demand(0.5);
        assert!((pin.demand(&opts) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn demand_multiplier_applies() {
        let opts = UserOptions {
            demand_multiplier: 2.0,
            ..UserOptions::default()
        };
        let chan = RRNode::new(RRNodeType::Chany, 2, 2, 2, 2);
        chan.add_demand(0.2);
        assert!((chan.demand(&opts) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn history_tracks_per_endpoint() {
        let n = RRNode::new(RRNodeType::Chanx, 1, 1, 1, 1);
        n.add_path_count_history(RRNodeId(7), 1.5);
        n.add_path_count_history(RRNodeId(7), 0.5);
        n.add_path_count_history(RRNodeId(9), 3.0);
        assert!((n.path_count_history(RRNodeId(7)) - 2.0).abs() < 1e-12);
        assert!((n.path_count_history(RRNodeId(9)) - 3.0).abs() < 1e-12);
        assert_eq!(n.path_count_history(RRNodeId(8)), 0.0);
    }
}
