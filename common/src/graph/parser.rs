use crate::arch::{ArchStructs, BlockType, GridTile};
use crate::graph::{RRGraph, RRNode, RRNodeId, RRNodeType};
use anyhow::{Result, anyhow, bail};
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Reads a simple rr structs dump:
///
/// ```text
/// grid 6 6
/// node 0 SOURCE 1 1 1 1 0 0
/// edge 0 1
/// ipin_source 4 7
/// ```
///
/// Nodes must be declared in id order. `ipin_source` attaches a previously
/// declared synthetic source to an IPIN.
pub fn parse(filename: &str) -> Result<(RRGraph, ArchStructs)> {
    let file = File::open(filename)?;
    let reader = BufReader::new(file);

    let mut graph = RRGraph::new();
    let mut grid_size = (0i32, 0i32);

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() || parts[0].starts_with('#') {
            continue;
        }

        let context = |what: &str| format!("{} at line {}", what, line_no + 1);

        match parts[0] {
            "grid" => {
                if parts.len() != 3 {
                    bail!(context("malformed grid line"));
                }
                grid_size = (parts[1].parse()?, parts[2].parse()?);
            }
            "node" => {
                if parts.len() != 9 {
                    bail!(context("malformed node line"));
                }
                let id: usize = parts[1].parse()?;
                if id != graph.num_nodes() {
                    bail!(context("node ids must be declared in order"));
                }
                let rr_type: RRNodeType = parts[2].parse().map_err(|e: String| anyhow!(e))?;
                let mut node = RRNode::new(
                    rr_type,
                    parts[3].parse()?,
                    parts[4].parse()?,
                    parts[5].parse()?,
                    parts[6].parse()?,
                );
                node.ptc = parts[7].parse()?;
                node.weight = parts[8].parse()?;
                if node.weight < 0 {
                    bail!(context("node weight must be non-negative"));
                }
                graph.add_node(node);
            }
            "edge" => {
                if parts.len() != 3 {
                    bail!(context("malformed edge line"));
                }
                let from: usize = parts[1].parse()?;
                let to: usize = parts[2].parse()?;
                if from >= graph.num_nodes() || to >= graph.num_nodes() {
                    bail!(context("edge references undeclared node"));
                }
                if from == to {
                    bail!(context("self edges are not allowed"));
                }
                graph.add_edge(RRNodeId::new(from), RRNodeId::new(to));
            }
            "ipin_source" => {
                if parts.len() != 3 {
                    bail!(context("malformed ipin_source line"));
                }
                let ipin: usize = parts[1].parse()?;
                let source: usize = parts[2].parse()?;
                if ipin >= graph.num_nodes() || source >= graph.num_nodes() {
                    bail!(context("ipin_source references undeclared node"));
                }
                if graph.nodes[ipin].rr_type != RRNodeType::Ipin {
                    bail!(context("ipin_source target is not an IPIN"));
                }
                graph.nodes[ipin].ipin_source = Some(RRNodeId::new(source));
            }
            other => bail!("unrecognized keyword '{}' at line {}", other, line_no + 1),
        }
    }

    if graph.num_nodes() == 0 {
        bail!("rr structs file declared no nodes");
    }

    let (size_x, size_y) = grid_size;
    let grid = if size_x > 0 && size_y > 0 {
        vec![vec![GridTile::default(); size_y as usize]; size_x as usize]
    } else {
        Vec::new()
    };
    let arch = ArchStructs {
        grid,
        block_types: vec![BlockType {
            name: "io".to_string(),
            classes: Vec::new(),
            is_global_pin: Vec::new(),
        }],
        fill_type_index: None,
    };

    Ok((graph, arch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "wotan_parser_test_{}_{:?}.txt",
            std::process::id(),
            std::thread::current().id()
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_nodes_and_edges() {
        let path = write_temp(
            "# single wire\n\
             grid 3 3\n\
             node 0 SOURCE 1 1 1 1 0 0\n\
             node 1 CHANX 1 1 1 1 0 1\n\
             node 2 SINK 1 1 1 1 0 0\n\
             edge 0 1\n\
             edge 1 2\n",
        );
        let (graph, arch) = parse(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.nodes[0].rr_type, RRNodeType::Source);
        assert_eq!(graph.nodes[1].weight, 1);
        assert_eq!(graph.nodes[0].out_edges, vec![RRNodeId(1)]);
        assert_eq!(graph.nodes[2].in_edges, vec![RRNodeId(1)]);
        assert_eq!(arch.grid_size(), (3, 3));
        assert!(arch.fill_type().is_none());
    }

    #[test]
    fn rejects_out_of_order_ids() {
        let path = write_temp("node 1 SOURCE 0 0 0 0 0 0\n");
        let result = parse(path.to_str().unwrap());
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_dangling_edge() {
        let path = write_temp("node 0 SOURCE 0 0 0 0 0 0\nedge 0 3\n");
        let result = parse(path.to_str().unwrap());
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
