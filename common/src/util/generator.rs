use crate::arch::{ArchStructs, BlockType, GridTile, PinClass, PinType};
use crate::graph::{RRGraph, RRNode, RRNodeId, RRNodeType};
use crate::util::config::FabricConfig;
use anyhow::{Result, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const IO_TYPE: usize = 0;
const FILL_TYPE: usize = 1;

/// Builds a synthetic island-style fabric: a perimeter I/O ring around
/// logic tiles, each with one super-source/super-sink pair, per-pin
/// OPIN/IPIN nodes and full-population connections onto the channel tracks.
/// Track-to-track switch connections are thinned by `switch_density`.
pub fn build_fabric(cfg: &FabricConfig) -> Result<(RRGraph, ArchStructs)> {
    let n = cfg.grid_size;
    if n < 4 {
        bail!("fabric grid size {} too small, need at least 4", n);
    }
    if cfg.channel_width == 0 || cfg.outputs_per_block == 0 || cfg.inputs_per_block == 0 {
        bail!("fabric channel width and pin counts must be positive");
    }
    if cfg.wire_length < 1 {
        bail!("fabric wire length must be at least 1");
    }
    if !(0.0..=1.0).contains(&cfg.switch_density) {
        bail!("switch density {} outside [0, 1]", cfg.switch_density);
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let arch = build_arch(cfg);
    let mut graph = RRGraph::new();

    let num_outputs = cfg.outputs_per_block;
    let num_inputs = cfg.inputs_per_block;
    let width = cfg.channel_width;
    let len = cfg.wire_length;

    // Terminals and pins for every logic tile.
    for x in 1..n - 1 {
        for y in 1..n - 1 {
            let mut source = RRNode::new(RRNodeType::Source, x, y, x, y);
            source.ptc = 0;
            graph.add_node(source);

            let mut sink = RRNode::new(RRNodeType::Sink, x, y, x, y);
            sink.ptc = 1;
            graph.add_node(sink);

            for pin in 0..num_outputs {
                let mut opin = RRNode::new(RRNodeType::Opin, x, y, x, y);
                opin.ptc = pin as i32;
                graph.add_node(opin);
            }
            for pin in 0..num_inputs {
                let mut ipin = RRNode::new(RRNodeType::Ipin, x, y, x, y);
                ipin.ptc = (num_outputs + pin) as i32;
                graph.add_node(ipin);
            }
        }
    }

    // Channel segments, one starting at every interior tile per track.
    for x in 1..n - 1 {
        for y in 1..n - 1 {
            for track in 0..width {
                let mut chanx =
                    RRNode::new(RRNodeType::Chanx, x, y, (x + len - 1).min(n - 2), y);
                chanx.ptc = track as i32;
                chanx.weight = 1;
                graph.add_node(chanx);

                let mut chany =
                    RRNode::new(RRNodeType::Chany, x, y, x, (y + len - 1).min(n - 2));
                chany.ptc = track as i32;
                chany.weight = 1;
                graph.add_node(chany);
            }
        }
    }

    // Intra-tile wiring: source to opins, ipins to sink, pins to tracks.
    for x in 1..n - 1 {
        for y in 1..n - 1 {
            let source = lookup(&graph, RRNodeType::Source, x, y, 0)?;
            let sink = lookup(&graph, RRNodeType::Sink, x, y, 1)?;

            for pin in 0..num_outputs {
                let opin = lookup(&graph, RRNodeType::Opin, x, y, pin as i32)?;
                graph.add_edge(source, opin);
                for track in 0..width as i32 {
                    graph.add_edge(opin, lookup(&graph, RRNodeType::Chanx, x, y, track)?);
                    graph.add_edge(opin, lookup(&graph, RRNodeType::Chany, x, y, track)?);
                }
            }
            for pin in 0..num_inputs {
                let ipin = lookup(&graph, RRNodeType::Ipin, x, y, (num_outputs + pin) as i32)?;
                graph.add_edge(ipin, sink);
            }
        }
    }

    // Tracks drive the ipins of every tile their footprint touches.
    for x in 1..n - 1 {
        for y in 1..n - 1 {
            for track in 0..width as i32 {
                let chanx = lookup(&graph, RRNodeType::Chanx, x, y, track)?;
                for xx in x..=graph[chanx].xhigh {
                    connect_track_to_ipins(&mut graph, chanx, xx, y, num_outputs, num_inputs)?;
                }
                let chany = lookup(&graph, RRNodeType::Chany, x, y, track)?;
                for yy in y..=graph[chany].yhigh {
                    connect_track_to_ipins(&mut graph, chany, x, yy, num_outputs, num_inputs)?;
                }
            }
        }
    }

    // Switch block: same-track connections to the continuing segment and the
    // crossing channel, both directions. This is where cycles come from.
    for x in 1..n - 1 {
        for y in 1..n - 1 {
            for track in 0..width as i32 {
                let chanx = lookup(&graph, RRNodeType::Chanx, x, y, track)?;
                let chany = lookup(&graph, RRNodeType::Chany, x, y, track)?;

                if x + len <= n - 2
                    && rng.gen_bool(cfg.switch_density)
                {
                    let next = lookup(&graph, RRNodeType::Chanx, x + len, y, track)?;
                    graph.add_edge(chanx, next);
                    graph.add_edge(next, chanx);
                }
                if y + len <= n - 2
                    && rng.gen_bool(cfg.switch_density)
                {
                    let next = lookup(&graph, RRNodeType::Chany, x, y + len, track)?;
                    graph.add_edge(chany, next);
                    graph.add_edge(next, chany);
                }
                if rng.gen_bool(cfg.switch_density) {
                    graph.add_edge(chanx, chany);
                    graph.add_edge(chany, chanx);
                }
            }
        }
    }

    attach_ipin_sources(&mut graph);

    log::info!(
        "generated fabric: {}x{} grid, {} tracks per channel, wire length {}, {} rr nodes",
        n,
        n,
        width,
        len,
        graph.num_nodes()
    );

    Ok((graph, arch))
}

/// Gives every fill-type IPIN a synthetic SOURCE whose out-edges are the
/// IPIN's driving channel nodes, so fanout enumeration can start at the
/// wires that feed the pin.
pub fn attach_ipin_sources(graph: &mut RRGraph) {
    let ipins: Vec<RRNodeId> = graph
        .iter_ids()
        .filter(|&id| graph[id].rr_type == RRNodeType::Ipin)
        .collect();

    for ipin in ipins {
        let preds: Vec<RRNodeId> = graph[ipin]
            .in_edges
            .iter()
            .copied()
            .filter(|&p| graph[p].rr_type.is_channel())
            .collect();

        let (xlow, ylow, xhigh, yhigh, ptc) = {
            let node = &graph[ipin];
            (node.xlow, node.ylow, node.xhigh, node.yhigh, node.ptc)
        };
        let mut synth = RRNode::new(RRNodeType::Source, xlow, ylow, xhigh, yhigh);
        synth.ptc = ptc;
        let synth_id = graph.add_unindexed_node(synth);

        for pred in preds {
            graph.add_edge(synth_id, pred);
        }
        graph[ipin].ipin_source = Some(synth_id);
    }
}

fn build_arch(cfg: &FabricConfig) -> ArchStructs {
    let n = cfg.grid_size;
    let num_outputs = cfg.outputs_per_block;
    let num_inputs = cfg.inputs_per_block;

    let io = BlockType {
        name: "io".to_string(),
        classes: Vec::new(),
        is_global_pin: Vec::new(),
    };
    let fill = BlockType {
        name: "clb".to_string(),
        classes: vec![
            PinClass {
                pin_type: PinType::Driver,
                pins: (0..num_outputs).collect(),
            },
            PinClass {
                pin_type: PinType::Receiver,
                pins: (num_outputs..num_outputs + num_inputs).collect(),
            },
        ],
        is_global_pin: vec![false; num_outputs + num_inputs],
    };

    let mut grid = vec![vec![GridTile::default(); n as usize]; n as usize];
    for (x, column) in grid.iter_mut().enumerate() {
        for (y, tile) in column.iter_mut().enumerate() {
            let perimeter =
                x == 0 || y == 0 || x == (n - 1) as usize || y == (n - 1) as usize;
            tile.type_index = if perimeter { IO_TYPE } else { FILL_TYPE };
        }
    }

    ArchStructs {
        grid,
        block_types: vec![io, fill],
        fill_type_index: Some(FILL_TYPE),
    }
}

fn connect_track_to_ipins(
    graph: &mut RRGraph,
    track: RRNodeId,
    x: i32,
    y: i32,
    num_outputs: usize,
    num_inputs: usize,
) -> Result<()> {
    for pin in 0..num_inputs {
        let ipin = lookup(graph, RRNodeType::Ipin, x, y, (num_outputs + pin) as i32)?;
        graph.add_edge(track, ipin);
    }
    Ok(())
}

fn lookup(graph: &RRGraph, rr_type: RRNodeType, x: i32, y: i32, ptc: i32) -> Result<RRNodeId> {
    match graph.node_index(rr_type, x, y, ptc) {
        Some(id) => Ok(id),
        None => bail!("missing {} node at ({},{}) ptc {}", rr_type.name(), x, y, ptc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cfg() -> FabricConfig {
        FabricConfig {
            grid_size: 6,
            channel_width: 2,
            wire_length: 1,
            inputs_per_block: 2,
            outputs_per_block: 1,
            switch_density: 1.0,
            seed: 0,
        }
    }

    #[test]
    fn fabric_has_expected_node_counts() {
        let (graph, arch) = build_fabric(&small_cfg()).unwrap();
        let interior = 4 * 4;
        let terminals = interior * 2;
        let pins = interior * 3;
        let channels = interior * 2 * 2;
        let synthetic = interior * 2;
        assert_eq!(graph.num_nodes(), terminals + pins + channels + synthetic);
        assert_eq!(arch.grid_size(), (6, 6));
        assert_eq!(arch.fill_type().unwrap().num_drivers(), 1);
        assert_eq!(arch.fill_type().unwrap().num_receivers(), 2);
    }

    #[test]
    fn sources_reach_sinks_through_channels() {
        let (graph, _) = build_fabric(&small_cfg()).unwrap();
        let source = graph.node_index(RRNodeType::Source, 1, 1, 0).unwrap();
        let opin = graph[source].out_edges[0];
        assert_eq!(graph[opin].rr_type, RRNodeType::Opin);
        let track = graph[opin].out_edges[0];
        assert!(graph[track].rr_type.is_channel());
        assert!(
            graph[track]
                .out_edges
                .iter()
                .any(|&e| graph[e].rr_type == RRNodeType::Ipin)
        );
    }

    #[test]
    fn ipins_carry_synthetic_sources() {
        let (graph, _) = build_fabric(&small_cfg()).unwrap();
        let ipin = graph.node_index(RRNodeType::Ipin, 2, 2, 1).unwrap();
        let synth = graph[ipin].ipin_source.expect("ipin without source");
        assert_eq!(graph[synth].rr_type, RRNodeType::Source);
        assert!(!graph[synth].out_edges.is_empty());
        assert!(
            graph[synth]
                .out_edges
                .iter()
                .all(|&e| graph[e].rr_type.is_channel())
        );
    }

    #[test]
    fn switch_density_zero_disconnects_tracks() {
        let mut cfg = small_cfg();
        cfg.switch_density = 0.0;
        let (graph, _) = build_fabric(&cfg).unwrap();
        for id in graph.iter_ids() {
            if graph[id].rr_type.is_channel() {
                assert!(
                    graph[id]
                        .out_edges
                        .iter()
                        .all(|&e| !graph[e].rr_type.is_channel())
                );
            }
        }
    }

    #[test]
    fn same_seed_same_fabric() {
        let mut cfg = small_cfg();
        cfg.switch_density = 0.5;
        cfg.seed = 42;
        let (a, _) = build_fabric(&cfg).unwrap();
        let (b, _) = build_fabric(&cfg).unwrap();
        assert_eq!(a.num_nodes(), b.num_nodes());
        for id in a.iter_ids() {
            assert_eq!(a[id].out_edges, b[id].out_edges);
        }
    }
}
