use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use wotan_common::arch::ArchStructs;
use wotan_common::graph::{RRGraph, parser};
use wotan_common::util::config::{Config, RrStructsMode};
use wotan_common::util::settings::AnalysisSettings;
use wotan_common::util::{generator, logger};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "wotan.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run routability analysis.
    Analyze,
    /// Generate a fabric from the [fabric] config and dump its rr structs.
    Generate {
        #[arg(long, default_value = "inputs/fabric.rr")]
        out: String,
    },
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let config = if args.config.exists() {
        log::info!("Loading configuration from {:?}", args.config);
        let config_str = std::fs::read_to_string(&args.config)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config TOML: {}", e))?
    } else {
        log::warn!(
            "Configuration file {:?} not found. Using internal defaults.",
            args.config
        );
        Config::default()
    };

    let command = args.command.unwrap_or(Commands::Analyze);

    match command {
        Commands::Analyze => run_analysis(&config)?,
        Commands::Generate { out } => {
            if let Some(parent) = Path::new(&out).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let (graph, arch) = generator::build_fabric(&config.fabric)?;
            save_rr_structs(&graph, &arch, &out)?;
            log::info!("Wrote {} rr nodes to {}", graph.num_nodes(), out);
        }
    }

    Ok(())
}

fn run_analysis(config: &Config) -> anyhow::Result<()> {
    let opts = &config.analysis;

    let (graph, arch) = match opts.rr_structs_mode {
        RrStructsMode::Simple => {
            if config.input.rr_structs_file.is_empty() {
                return Err(anyhow::anyhow!(
                    "simple mode needs an rr_structs_file in the [input] section"
                ));
            }
            log::info!("Parsing rr structs: {}", config.input.rr_structs_file);
            parser::parse(&config.input.rr_structs_file).map_err(|e| {
                anyhow::anyhow!(
                    "Invalid rr structs in '{}': {}",
                    config.input.rr_structs_file,
                    e
                )
            })?
        }
        RrStructsMode::Vpr => {
            if !config.input.rr_structs_file.is_empty() {
                return Err(anyhow::anyhow!(
                    "vpr mode analyzes a generated fabric; rr_structs_file applies to simple mode"
                ));
            }
            generator::build_fabric(&config.fabric)?
        }
    };

    let settings = match opts.rr_structs_mode {
        RrStructsMode::Vpr => AnalysisSettings::from_arch(opts, &arch),
        RrStructsMode::Simple => AnalysisSettings::simple(opts),
    };

    log::info!("Starting routability analysis...");
    if let Err(e) = wotan_analysis::run_analysis(&graph, &arch, &settings, opts) {
        log::error!("Analysis failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn save_rr_structs(graph: &RRGraph, arch: &ArchStructs, filename: &str) -> std::io::Result<()> {
    let mut file = std::fs::File::create(filename)?;

    let (size_x, size_y) = arch.grid_size();
    if size_x > 0 && size_y > 0 {
        writeln!(file, "grid {} {}", size_x, size_y)?;
    }

    for id in graph.iter_ids() {
        let n = &graph[id];
        writeln!(
            file,
            "node {} {} {} {} {} {} {} {}",
            id.index(),
            n.rr_type.name(),
            n.xlow,
            n.ylow,
            n.xhigh,
            n.yhigh,
            n.ptc,
            n.weight
        )?;
    }
    for id in graph.iter_ids() {
        for &to in &graph[id].out_edges {
            writeln!(file, "edge {} {}", id.index(), to.index())?;
        }
    }
    for id in graph.iter_ids() {
        if let Some(source) = graph[id].ipin_source {
            writeln!(file, "ipin_source {} {}", id.index(), source.index())?;
        }
    }

    Ok(())
}
