pub mod conn;
pub mod dispatch;
pub mod distances;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pq;
pub mod simple;
pub mod state;
pub mod traversal;

pub use error::AnalysisError;

use wotan_common::arch::ArchStructs;
use wotan_common::graph::RRGraph;
use wotan_common::util::config::{RrStructsMode, UserOptions};
use wotan_common::util::settings::AnalysisSettings;

/// Runs routability analysis over the given graph, dispatching on the
/// configured structure mode.
pub fn run_analysis(
    graph: &RRGraph,
    arch: &ArchStructs,
    settings: &AnalysisSettings,
    opts: &UserOptions,
) -> Result<(), AnalysisError> {
    match opts.rr_structs_mode {
        RrStructsMode::Vpr => dispatch::analyze_fpga_architecture(graph, arch, settings, opts),
        RrStructsMode::Simple => simple::analyze_simple_graph(graph, opts),
    }
}
