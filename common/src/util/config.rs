use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub analysis: UserOptions,
    #[serde(default)]
    pub fabric: FabricConfig,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RrStructsMode {
    /// Full FPGA fabric analysis over test tiles.
    Vpr,
    /// One-source/one-sink graph analysis, for hand-built graphs.
    Simple,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityMode {
    Propagate,
    Cutline,
    CutlineSimple,
    CutlineRecursive,
    ReliabilityPolynomial,
}

#[derive(Debug, Deserialize)]
pub struct InputConfig {
    /// Path to an rr structs dump. Empty means the fabric is generated from
    /// the [fabric] section instead.
    #[serde(default)]
    pub rr_structs_file: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            rr_structs_file: String::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct UserOptions {
    #[serde(default = "default_rr_structs_mode")]
    pub rr_structs_mode: RrStructsMode,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    #[serde(default = "default_max_connection_length")]
    pub max_connection_length: i32,
    #[serde(default)]
    pub analyze_core: bool,
    #[serde(default = "default_demand_multiplier")]
    pub demand_multiplier: f64,
    /// When set, every channel node reports this demand instead of the
    /// enumerated value. Required by the reliability polynomial model.
    #[serde(default)]
    pub use_routing_node_demand: Option<f64>,
    #[serde(default = "default_keep_path_count_history")]
    pub keep_path_count_history: bool,
    #[serde(default = "default_probability_mode")]
    pub probability_mode: ProbabilityMode,
    /// Per-connection path weights are capped at source-sink distance times
    /// this factor.
    #[serde(default = "default_path_flexibility_factor")]
    pub path_flexibility_factor: f64,
    /// Upper envelope on path weight: length times this factor.
    #[serde(default = "default_max_path_weight_factor")]
    pub max_path_weight_factor: i32,
    #[serde(default = "default_pin_probability")]
    pub pin_probability: f32,
    /// Indexed by connection length, entry 0 unused. Empty means uniform.
    #[serde(default)]
    pub length_probabilities: Vec<f32>,
}

impl Default for UserOptions {
    fn default() -> Self {
        Self {
            rr_structs_mode: default_rr_structs_mode(),
            num_threads: default_num_threads(),
            max_connection_length: default_max_connection_length(),
            analyze_core: false,
            demand_multiplier: default_demand_multiplier(),
            use_routing_node_demand: None,
            keep_path_count_history: default_keep_path_count_history(),
            probability_mode: default_probability_mode(),
            path_flexibility_factor: default_path_flexibility_factor(),
            max_path_weight_factor: default_max_path_weight_factor(),
            pin_probability: default_pin_probability(),
            length_probabilities: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FabricConfig {
    /// Grid side length, perimeter I/O ring included.
    #[serde(default = "default_grid_size")]
    pub grid_size: i32,
    #[serde(default = "default_channel_width")]
    pub channel_width: usize,
    #[serde(default = "default_wire_length")]
    pub wire_length: i32,
    #[serde(default = "default_inputs_per_block")]
    pub inputs_per_block: usize,
    #[serde(default = "default_outputs_per_block")]
    pub outputs_per_block: usize,
    /// Fraction of switch-block track-to-track connections kept.
    #[serde(default = "default_switch_density")]
    pub switch_density: f64,
    #[serde(default)]
    pub seed: u64,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            channel_width: default_channel_width(),
            wire_length: default_wire_length(),
            inputs_per_block: default_inputs_per_block(),
            outputs_per_block: default_outputs_per_block(),
            switch_density: default_switch_density(),
            seed: 0,
        }
    }
}

fn default_rr_structs_mode() -> RrStructsMode {
    RrStructsMode::Vpr
}

fn default_num_threads() -> usize {
    1
}

fn default_max_connection_length() -> i32 {
    3
}

fn default_demand_multiplier() -> f64 {
    1.0
}

fn default_keep_path_count_history() -> bool {
    true
}

fn default_probability_mode() -> ProbabilityMode {
    ProbabilityMode::Propagate
}

fn default_path_flexibility_factor() -> f64 {
    1.3
}

fn default_max_path_weight_factor() -> i32 {
    4
}

fn default_pin_probability() -> f32 {
    1.0
}

fn default_grid_size() -> i32 {
    12
}

fn default_channel_width() -> usize {
    8
}

fn default_wire_length() -> i32 {
    1
}

fn default_inputs_per_block() -> usize {
    4
}

fn default_outputs_per_block() -> usize {
    2
}

fn default_switch_density() -> f64 {
    1.0
}
