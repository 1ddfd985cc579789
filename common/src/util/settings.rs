use crate::arch::ArchStructs;
use crate::geom::Coordinate;
use crate::util::config::UserOptions;

/// Probability weights and test-tile selection driving the analysis.
#[derive(Clone, Debug)]
pub struct AnalysisSettings {
    /// Indexed by connection length; entry 0 is unused.
    pub length_probabilities: Vec<f32>,
    /// Indexed by fill-type pin number.
    pub pin_probabilities: Vec<f32>,
    pub test_tile_coords: Vec<Coordinate>,
    max_path_weight_factor: i32,
}

impl AnalysisSettings {
    /// Builds settings for a full fabric: uniform length probabilities unless
    /// the config supplies its own, a flat per-pin probability with global
    /// pins zeroed, and every strictly interior tile as a test tile.
    pub fn from_arch(opts: &UserOptions, arch: &ArchStructs) -> Self {
        let max_len = opts.max_connection_length as usize;
        let length_probabilities = if opts.length_probabilities.is_empty() {
            let uniform = 1.0 / max_len as f32;
            let mut probs = vec![uniform; max_len + 1];
            probs[0] = 0.0;
            probs
        } else {
            let mut probs = opts.length_probabilities.clone();
            probs.resize(max_len + 1, 0.0);
            probs
        };

        let pin_probabilities = match arch.fill_type() {
            Some(fill) => fill
                .is_global_pin
                .iter()
                .map(|&global| if global { 0.0 } else { opts.pin_probability })
                .collect(),
            None => Vec::new(),
        };

        let (size_x, size_y) = arch.grid_size();
        let mut test_tile_coords = Vec::new();
        for x in 1..size_x - 1 {
            for y in 1..size_y - 1 {
                test_tile_coords.push(Coordinate::new(x, y));
            }
        }

        Self {
            length_probabilities,
            pin_probabilities,
            test_tile_coords,
            max_path_weight_factor: opts.max_path_weight_factor,
        }
    }

    /// Settings for the simple-graph mode, where no fabric exists.
    pub fn simple(opts: &UserOptions) -> Self {
        Self {
            length_probabilities: Vec::new(),
            pin_probabilities: Vec::new(),
            test_tile_coords: Vec::new(),
            max_path_weight_factor: opts.max_path_weight_factor,
        }
    }

    /// Maximum allowed path weight for a connection of the given length. The
    /// per-connection tightening against actual source-sink distance happens
    /// later; this only needs to be a safe envelope.
    pub fn max_path_weight(&self, conn_length: i32) -> i32 {
        conn_length * self.max_path_weight_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{BlockType, GridTile, PinClass, PinType};

    fn small_arch() -> ArchStructs {
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
            is_global_pin: vec![false, false, true],
        };
        ArchStructs {
            grid: vec![vec![GridTile::default(); 5]; 5],
            block_types: vec![fill],
            fill_type_index: Some(0),
        }
    }

    #[test]
    fn uniform_length_probabilities_sum_to_one() {
        let opts = UserOptions {
            max_connection_length: 4,
            ..UserOptions::default()
        };
        let settings = AnalysisSettings::from_arch(&opts, &small_arch());
        assert_eq!(settings.length_probabilities.len(), 5);
        assert_eq!(settings.length_probabilities[0], 0.0);
        let sum: f32 = settings.length_probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn global_pins_get_zero_probability() {
        let opts = UserOptions::default();
        let settings = AnalysisSettings::from_arch(&opts, &small_arch());
        assert_eq!(settings.pin_probabilities, vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_tiles_exclude_perimeter() {
        let opts = UserOptions::default();
        let settings = AnalysisSettings::from_arch(&opts, &small_arch());
        assert_eq!(settings.test_tile_coords.len(), 9);
        assert!(
            settings
                .test_tile_coords
                .iter()
                .all(|c| c.x >= 1 && c.x <= 3 && c.y >= 1 && c.y <= 3)
        );
    }

    #[test]
    fn max_path_weight_scales_with_length() {
        let opts = UserOptions::default();
        let settings = AnalysisSettings::simple(&opts);
        assert_eq!(settings.max_path_weight(3), 12);
    }
}
