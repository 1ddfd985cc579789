use crate::geom::Coordinate;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinType {
    Driver,
    Receiver,
}

#[derive(Clone, Debug)]
pub struct PinClass {
    pub pin_type: PinType,
    pub pins: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct BlockType {
    pub name: String,
    pub classes: Vec<PinClass>,
    /// Indexed by pin number. Global pins (clocks, resets) are excluded from
    /// routability analysis.
    pub is_global_pin: Vec<bool>,
}

impl BlockType {
    pub fn num_pins(&self) -> usize {
        self.is_global_pin.len()
    }

    pub fn num_drivers(&self) -> usize {
        self.classes
            .iter()
            .filter(|c| c.pin_type == PinType::Driver)
            .map(|c| c.pins.len())
            .sum()
    }

    pub fn num_receivers(&self) -> usize {
        self.classes
            .iter()
            .filter(|c| c.pin_type == PinType::Receiver)
            .map(|c| c.pins.len())
            .sum()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GridTile {
    pub type_index: usize,
    pub width_offset: i32,
    pub height_offset: i32,
}

/// Grid and block-type data for the architecture under analysis. Built by a
/// reader or by the fabric generator; read-only during analysis.
pub struct ArchStructs {
    pub grid: Vec<Vec<GridTile>>,
    pub block_types: Vec<BlockType>,
    /// Index of the block type that fills every non-perimeter tile. None for
    /// simple graphs that do not model an FPGA.
    pub fill_type_index: Option<usize>,
}

impl ArchStructs {
    pub fn grid_size(&self) -> (i32, i32) {
        let x = self.grid.len() as i32;
        let y = if self.grid.is_empty() {
            0
        } else {
            self.grid[0].len() as i32
        };
        (x, y)
    }

    pub fn tile(&self, coord: Coordinate) -> &GridTile {
        &self.grid[coord.x as usize][coord.y as usize]
    }

    pub fn fill_type(&self) -> Option<&BlockType> {
        self.fill_type_index.map(|i| &self.block_types[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_class_block() -> BlockType {
        BlockType {
            name: "clb".to_string(),
            classes: vec![
                PinClass {
                    pin_type: PinType::Driver,
                    pins: vec![0, 1],
                },
                PinClass {
                    pin_type: PinType::Receiver,
                    pins: vec![2, 3, 4],
                },
            ],
            is_global_pin: vec![false; 5],
        }
    }

    #[test]
    fn pin_counts() {
        let bt = two_class_block();
        assert_eq!(bt.num_pins(), 5);
        assert_eq!(bt.num_drivers(), 2);
        assert_eq!(bt.num_receivers(), 3);
    }

    #[test]
    fn grid_size_and_fill_lookup() {
        let arch = ArchStructs {
            grid: vec![vec![GridTile::default(); 4]; 6],
            block_types: vec![two_class_block()],
            fill_type_index: Some(0),
        };
        assert_eq!(arch.grid_size(), (6, 4));
        assert_eq!(arch.fill_type().unwrap().name, "clb");
    }
}
