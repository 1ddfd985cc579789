//! Workload construction and worker sharding for full-fabric analysis.
//!
//! Connections are analyzed in two global phases: ENUMERATE walks every
//! representative pair and writes node demands, then PROBABILITY re-walks
//! them reading those demands. Work items are dealt round-robin onto
//! per-thread lists at dispatch time; workers own their node-state arenas
//! and only merge results under the shared mutex.

use crate::conn::{TopologicalMode, analyze_connection, source_probabilities};
use crate::error::AnalysisError;
use crate::metrics::{
    AnalysisResults, WORST_ROUTABILITY_PERCENTILE, demand_totals, node_demand_metric,
};
use crate::state::NodeState;
use wotan_common::arch::{ArchStructs, PinType};
use wotan_common::geom::Coordinate;
use wotan_common::graph::{RRGraph, RRNodeId, RRNodeType};
use wotan_common::util::config::UserOptions;
use wotan_common::util::profiler::ScopedTimer;
use wotan_common::util::settings::AnalysisSettings;

/// With core analysis enabled, probability is only measured for tiles at
/// least this far from the perimeter.
const CORE_OFFSET: i32 = 3;

type Workload = Vec<Vec<(RRNodeId, Coordinate)>>;

/// Entry point for fabric analysis: sizes the pessimistic queues, runs the
/// enumeration phase, then the probability phase.
pub fn analyze_fpga_architecture(
    graph: &RRGraph,
    arch: &ArchStructs,
    settings: &AnalysisSettings,
    opts: &UserOptions,
) -> Result<(), AnalysisError> {
    if opts.num_threads == 0 {
        return Err(AnalysisError::config("num_threads must be at least 1"));
    }
    if opts.max_connection_length < 1 {
        return Err(AnalysisError::config(
            "max_connection_length must be at least 1",
        ));
    }

    let conns_at_length = conn_length_stats(arch, opts)?;
    let results = AnalysisResults::new(opts.max_connection_length, &conns_at_length);

    analyze_test_tile_connections(
        graph,
        arch,
        settings,
        opts,
        &results,
        TopologicalMode::Enumerate,
    )?;
    analyze_test_tile_connections(
        graph,
        arch,
        settings,
        opts,
        &results,
        TopologicalMode::Probability,
    )?;

    Ok(())
}

/// Shards the test-tile workload across worker threads and runs one phase.
pub fn analyze_test_tile_connections(
    graph: &RRGraph,
    arch: &ArchStructs,
    settings: &AnalysisSettings,
    opts: &UserOptions,
    results: &AnalysisResults,
    mode: TopologicalMode,
) -> Result<(), AnalysisError> {
    let fill_index = arch
        .fill_type_index
        .ok_or_else(|| AnalysisError::config("fabric analysis requires a fill block type"))?;
    let fill_type = &arch.block_types[fill_index];
    let (size_x, size_y) = arch.grid_size();

    let phase_name = match mode {
        TopologicalMode::Enumerate => "path enumeration",
        TopologicalMode::Probability => "probability analysis",
    };
    log::info!(
        "{} over block type '{}' with {} threads",
        phase_name,
        fill_type.name,
        opts.num_threads
    );
    let _timer = ScopedTimer::new(phase_name);

    // Arena rows must cover the loosest budget any connection can see.
    let arena_bound = (settings.max_path_weight(opts.max_connection_length) as f64
        * opts.path_flexibility_factor) as i32;
    log::info!("absolute max possible path weight: {}", arena_bound);

    // Separate round-robin counters for driver and receiver classes keep the
    // shards balanced for both kinds of enumeration origin.
    let mut workload: Workload = vec![Vec::new(); opts.num_threads];
    let mut next_source_thread = 0usize;
    let mut next_sink_thread = 0usize;

    for &tile_coord in &settings.test_tile_coords {
        if mode == TopologicalMode::Probability
            && opts.analyze_core
            && (tile_coord.x < CORE_OFFSET
                || tile_coord.x > size_x - 1 - CORE_OFFSET
                || tile_coord.y < CORE_OFFSET
                || tile_coord.y > size_y - 1 - CORE_OFFSET)
        {
            continue;
        }

        let tile = arch.tile(tile_coord);
        let tile_type = &arch.block_types[tile.type_index];

        for (iclass, class) in tile_type.classes.iter().enumerate() {
            match class.pin_type {
                PinType::Driver => {
                    let source = graph
                        .node_index(RRNodeType::Source, tile_coord.x, tile_coord.y, iclass as i32)
                        .ok_or_else(|| {
                            AnalysisError::graph(format!(
                                "no SOURCE node for class {} at {}",
                                iclass, tile_coord
                            ))
                        })?;
                    workload[next_source_thread].push((source, tile_coord));
                    next_source_thread = (next_source_thread + 1) % opts.num_threads;
                }
                PinType::Receiver => {
                    // Receiver pins are enumeration origins too (fanout
                    // modeling), one item per pin rather than per class.
                    for &pin in &class.pins {
                        let ipin = graph
                            .node_index(RRNodeType::Ipin, tile_coord.x, tile_coord.y, pin as i32)
                            .ok_or_else(|| {
                                AnalysisError::graph(format!(
                                    "no IPIN node for pin {} at {}",
                                    pin, tile_coord
                                ))
                            })?;
                        workload[next_sink_thread].push((ipin, tile_coord));
                        next_sink_thread = (next_sink_thread + 1) % opts.num_threads;
                    }
                }
            }
        }
    }

    launch_workers(graph, arch, settings, opts, results, mode, &workload, arena_bound)?;

    report_phase(graph, opts, results, mode)
}

/// Spawns N-1 workers and runs the last shard on the calling thread.
#[allow(clippy::too_many_arguments)]
fn launch_workers(
    graph: &RRGraph,
    arch: &ArchStructs,
    settings: &AnalysisSettings,
    opts: &UserOptions,
    results: &AnalysisResults,
    mode: TopologicalMode,
    workload: &Workload,
    arena_bound: i32,
) -> Result<(), AnalysisError> {
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workload.len().saturating_sub(1));
        for items in workload.iter().skip(1) {
            handles.push(scope.spawn(move || {
                run_worker(graph, arch, settings, opts, results, mode, items, arena_bound)
            }));
        }

        let mut outcome = run_worker(
            graph,
            arch,
            settings,
            opts,
            results,
            mode,
            &workload[0],
            arena_bound,
        );
        for handle in handles {
            match handle.join() {
                Ok(res) => {
                    if outcome.is_ok() {
                        outcome = res;
                    }
                }
                Err(_) => {
                    outcome = Err(AnalysisError::resource("failed to join worker thread"));
                }
            }
        }
        outcome
    })
}

/// One worker's share of a phase: for each assigned (origin, tile) item,
/// analyze every legal sink at every legal connection length.
#[allow(clippy::too_many_arguments)]
fn run_worker(
    graph: &RRGraph,
    arch: &ArchStructs,
    settings: &AnalysisSettings,
    opts: &UserOptions,
    results: &AnalysisResults,
    mode: TopologicalMode,
    items: &[(RRNodeId, Coordinate)],
    arena_bound: i32,
) -> Result<(), AnalysisError> {
    let fill_index = arch
        .fill_type_index
        .ok_or_else(|| AnalysisError::config("fabric analysis requires a fill block type"))?;
    let fill_type = &arch.block_types[fill_index];
    let (size_x, size_y) = arch.grid_size();

    let mut state = NodeState::new(graph.num_nodes(), arena_bound);

    for &(origin, tile_coord) in items {
        let (sum_source_probs, _) =
            source_probabilities(graph, origin, &settings.pin_probabilities, fill_type)?;
        if sum_source_probs == 0.0 {
            continue;
        }

        let tile = arch.tile(tile_coord);
        if tile.type_index != fill_index {
            return Err(AnalysisError::graph(format!(
                "test tile at {} is not of fill type",
                tile_coord
            )));
        }
        if tile.width_offset != 0 || tile.height_offset != 0 {
            return Err(AnalysisError::graph(format!(
                "fill tile at {} has a nonzero width/height offset",
                tile_coord
            )));
        }

        // The farthest non-perimeter block bounds reachable lengths.
        let max_block_dist = tile_coord
            .dx_plus_dy(1, 1)
            .max(tile_coord.dx_plus_dy(1, size_y - 2))
            .max(tile_coord.dx_plus_dy(size_x - 2, size_y - 2))
            .max(tile_coord.dx_plus_dy(size_x - 2, 1));
        if max_block_dist < opts.max_connection_length {
            return Err(AnalysisError::graph(format!(
                "tile {} cannot reach any block {} tiles away",
                tile_coord, opts.max_connection_length
            )));
        }

        for conn_length in 1..=opts.max_connection_length {
            if settings
                .length_probabilities
                .get(conn_length as usize)
                .copied()
                .unwrap_or(0.0)
                == 0.0
            {
                continue;
            }

            let num_conns = conns_at_distance_from_tile(
                tile_coord,
                conn_length,
                arch,
                fill_index,
            )?;

            for dest in dest_coords(tile_coord, conn_length, size_x, size_y) {
                let dest_tile = arch.tile(dest);
                if dest_tile.type_index != fill_index {
                    return Err(AnalysisError::graph(format!(
                        "destination block at {} is not of fill type",
                        dest
                    )));
                }
                let dest_type = &arch.block_types[dest_tile.type_index];

                for (iclass, class) in dest_type.classes.iter().enumerate() {
                    if class.pin_type != PinType::Receiver || class.pins.is_empty() {
                        continue;
                    }
                    if dest_type.is_global_pin[class.pins[0]] {
                        continue;
                    }
                    let sink = graph
                        .node_index(RRNodeType::Sink, dest.x, dest.y, iclass as i32)
                        .ok_or_else(|| {
                            AnalysisError::graph(format!(
                                "no SINK node for class {} at {}",
                                iclass, dest
                            ))
                        })?;

                    analyze_connection(
                        graph, arch, settings, &mut state, results, origin, sink, conn_length,
                        num_conns, mode, opts,
                    )?;
                    results.increment_desired();
                }
            }
        }
    }

    Ok(())
}

/// Destination tiles exactly `length` away, clipped to the strict interior.
/// The idy step of max(2 * y_distance, 1) guards the y_distance = 0 case.
fn dest_coords(tile: Coordinate, length: i32, size_x: i32, size_y: i32) -> Vec<Coordinate> {
    let mut coords = Vec::new();
    for idx in -length..=length {
        let y_distance = length - idx.abs();
        let step = (2 * y_distance).max(1);
        let mut idy = -y_distance;
        while idy <= y_distance {
            let dest_x = tile.x + idx;
            let dest_y = tile.y + idy;
            if dest_x > 0 && dest_x < size_x - 1 && dest_y > 0 && dest_y < size_y - 1 {
                coords.push(Coordinate::new(dest_x, dest_y));
            }
            idy += step;
        }
    }
    coords
}

/// Number of receiver pins on fill blocks exactly `length` away from a tile.
pub fn conns_at_distance_from_tile(
    tile: Coordinate,
    length: i32,
    arch: &ArchStructs,
    fill_index: usize,
) -> Result<usize, AnalysisError> {
    let (size_x, size_y) = arch.grid_size();
    let mut num_conns = 0;
    for dest in dest_coords(tile, length, size_x, size_y) {
        let dest_tile = arch.tile(dest);
        if dest_tile.type_index != fill_index {
            return Err(AnalysisError::graph(format!(
                "interior block at {} is not of fill type",
                dest
            )));
        }
        num_conns += arch.block_types[dest_tile.type_index].num_receivers();
    }
    Ok(num_conns)
}

/// Total probability-phase connections at each length, used to size the
/// pessimistic queues.
pub fn conn_length_stats(
    arch: &ArchStructs,
    opts: &UserOptions,
) -> Result<Vec<usize>, AnalysisError> {
    let fill_index = arch
        .fill_type_index
        .ok_or_else(|| AnalysisError::config("fabric analysis requires a fill block type"))?;
    let fill_type = &arch.block_types[fill_index];
    let (size_x, size_y) = arch.grid_size();

    let (from_x, to_x, from_y, to_y) = if opts.analyze_core {
        (
            CORE_OFFSET,
            size_x - 1 - CORE_OFFSET,
            CORE_OFFSET,
            size_y - 1 - CORE_OFFSET,
        )
    } else {
        (1, size_x - 2, 1, size_y - 2)
    };

    let mut conns_at_length = vec![0usize; opts.max_connection_length as usize + 1];
    for x in from_x..=to_x {
        for y in from_y..=to_y {
            let tile = arch.tile(Coordinate::new(x, y));
            if tile.type_index != fill_index {
                return Err(AnalysisError::graph(format!(
                    "interior block at ({},{}) is not of fill type",
                    x, y
                )));
            }
            if tile.width_offset > 0 || tile.height_offset > 0 {
                return Err(AnalysisError::graph(format!(
                    "fill tile at ({},{}) has a nonzero width/height offset",
                    x, y
                )));
            }

            let num_drivers = fill_type.num_drivers();
            for length in 1..=opts.max_connection_length {
                conns_at_length[length as usize] += num_drivers
                    * conns_at_distance_from_tile(
                        Coordinate::new(x, y),
                        length,
                        arch,
                        fill_index,
                    )?;
            }
        }
    }
    Ok(conns_at_length)
}

/// Summary metrics to stdout at the end of a phase.
fn report_phase(
    graph: &RRGraph,
    opts: &UserOptions,
    results: &AnalysisResults,
    mode: TopologicalMode,
) -> Result<(), AnalysisError> {
    match mode {
        TopologicalMode::Enumerate => {
            let (_, _, desired, num) = results.totals();
            let (total_demand, squared_demand, num_routing) = demand_totals(graph, opts);
            let normalized_demand = node_demand_metric(graph, opts)?;
            let fraction = if desired > 0 {
                num as f64 / desired as f64
            } else {
                0.0
            };
            println!("fraction enumerated: {:.6}", fraction);
            println!("Total demand: {:.6}", total_demand);
            println!("Total squared demand: {:.6}", squared_demand);
            println!("Normalized demand: {:.6}", normalized_demand);
            println!(
                "Normalized squared demand: {:.6}",
                squared_demand / num_routing.max(1) as f64
            );
        }
        TopologicalMode::Probability => {
            let worst_sum = results.pessimistic_sum();
            let (total_prob, max_possible, _, _) = results.totals();
            if max_possible > 0.0 {
                println!("Total prob: {:.6}", total_prob / max_possible);
                println!(
                    "Pessimistic prob: {:.6}",
                    worst_sum / (max_possible * WORST_ROUTABILITY_PERCENTILE)
                );
            } else {
                println!("Total prob: 0.000000");
                println!("Pessimistic prob: 0.000000");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wotan_common::arch::{BlockType, GridTile, PinClass};
    use wotan_common::util::config::FabricConfig;
    use wotan_common::util::generator::build_fabric;

    fn ring_arch(n: usize) -> ArchStructs {
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
                    pins: vec![0],
                },
                PinClass {
                    pin_type: PinType::Receiver,
                    pins: vec![1, 2],
                },
            ],
            is_global_pin: vec![false; 3],
        };
        let mut grid = vec![vec![GridTile::default(); n]; n];
        for (x, column) in grid.iter_mut().enumerate() {
            for (y, tile) in column.iter_mut().enumerate() {
                let perimeter = x == 0 || y == 0 || x == n - 1 || y == n - 1;
                tile.type_index = if perimeter { 0 } else { 1 };
            }
        }
        ArchStructs {
            grid,
            block_types: vec![io, fill],
            fill_type_index: Some(1),
        }
    }

    #[test]
    fn dest_ring_has_four_axial_tiles_at_length_one() {
        let coords = dest_coords(Coordinate::new(3, 3), 1, 8, 8);
        assert_eq!(coords.len(), 4);
        for c in &coords {
            assert_eq!(c.dx_plus_dy(3, 3), 1);
        }
    }

    #[test]
    fn dest_ring_clips_to_interior() {
        // Tile adjacent to the perimeter loses the clipped neighbors.
        let coords = dest_coords(Coordinate::new(1, 1), 1, 8, 8);
        assert_eq!(coords.len(), 2);
    }

    #[test]
    fn dest_ring_length_two_is_a_diamond() {
        let coords = dest_coords(Coordinate::new(4, 4), 2, 12, 12);
        assert_eq!(coords.len(), 8);
        for c in &coords {
            assert_eq!(c.dx_plus_dy(4, 4), 2);
        }
    }

    #[test]
    fn conns_count_receiver_pins() {
        let arch = ring_arch(8);
        let conns =
            conns_at_distance_from_tile(Coordinate::new(3, 3), 1, &arch, 1).unwrap();
        // 4 neighbors, 2 receiver pins each.
        assert_eq!(conns, 8);
    }

    #[test]
    fn length_stats_cover_interior() {
        let arch = ring_arch(8);
        let opts = UserOptions {
            max_connection_length: 2,
            ..UserOptions::default()
        };
        let stats = conn_length_stats(&arch, &opts).unwrap();
        assert_eq!(stats[0], 0);
        assert!(stats[1] > 0);
        assert!(stats[2] > 0);
    }

    #[test]
    fn full_fabric_analysis_runs_both_phases() {
        let fabric = FabricConfig {
            grid_size: 6,
            channel_width: 2,
            wire_length: 1,
            inputs_per_block: 1,
            outputs_per_block: 1,
            switch_density: 1.0,
            seed: 1,
        };
        let (graph, arch) = build_fabric(&fabric).unwrap();
        let opts = UserOptions {
            max_connection_length: 2,
            num_threads: 2,
            ..UserOptions::default()
        };
        let settings = AnalysisSettings::from_arch(&opts, &arch);
        analyze_fpga_architecture(&graph, &arch, &settings, &opts).unwrap();
        assert!(
            graph
                .nodes
                .iter()
                .any(|n| n.rr_type.is_channel() && n.raw_demand() > 0.0)
        );
    }

    #[test]
    fn core_filter_skips_perimeter_adjacent_tiles() {
        let fabric = FabricConfig {
            grid_size: 12,
            channel_width: 1,
            wire_length: 1,
            inputs_per_block: 1,
            outputs_per_block: 1,
            switch_density: 1.0,
            seed: 3,
        };
        let run = |analyze_core: bool| {
            let (graph, arch) = build_fabric(&fabric).unwrap();
            let opts = UserOptions {
                max_connection_length: 1,
                analyze_core,
                ..UserOptions::default()
            };
            let settings = AnalysisSettings::from_arch(&opts, &arch);
            let conns = conn_length_stats(&arch, &opts).unwrap();
            let results = AnalysisResults::new(opts.max_connection_length, &conns);
            analyze_test_tile_connections(
                &graph,
                &arch,
                &settings,
                &opts,
                &results,
                TopologicalMode::Probability,
            )
            .unwrap();
            results.totals().2
        };
        // Core tiles are x, y in [3, 8]: 36 tiles, each with one source item
        // and one receiver item, 4 interior neighbors, 1 sink class.
        assert_eq!(run(true), 288);
        assert!(run(false) > 288);
    }

    #[test]
    fn single_thread_enumeration_is_deterministic() {
        let fabric = FabricConfig {
            grid_size: 6,
            channel_width: 2,
            wire_length: 1,
            inputs_per_block: 2,
            outputs_per_block: 1,
            switch_density: 0.6,
            seed: 7,
        };
        let run = || {
            let (graph, arch) = build_fabric(&fabric).unwrap();
            let opts = UserOptions {
                max_connection_length: 2,
                ..UserOptions::default()
            };
            let settings = AnalysisSettings::from_arch(&opts, &arch);
            let conns = conn_length_stats(&arch, &opts).unwrap();
            let results = AnalysisResults::new(opts.max_connection_length, &conns);
            analyze_test_tile_connections(
                &graph,
                &arch,
                &settings,
                &opts,
                &results,
                TopologicalMode::Enumerate,
            )
            .unwrap();
            graph
                .nodes
                .iter()
                .map(|n| n.raw_demand())
                .collect::<Vec<f64>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn core_filter_narrows_length_stats() {
        let arch = ring_arch(12);
        let opts_all = UserOptions {
            max_connection_length: 1,
            ..UserOptions::default()
        };
        let opts_core = UserOptions {
            max_connection_length: 1,
            analyze_core: true,
            ..UserOptions::default()
        };
        let all = conn_length_stats(&arch, &opts_all).unwrap();
        let core = conn_length_stats(&arch, &opts_core).unwrap();
        // Core region of a 12x12 grid is x, y in [3, 8]: fewer tiles.
        assert!(core[1] < all[1]);
        assert!(core[1] > 0);
    }
}
