//! Cell storage for [`Raster`](super::Raster).
//!
//! Exactly one of three layouts holds the values of a loaded raster:
//!
//! - `Dense1D`: one value per grid cell, row-major.
//! - `Dense2D`: `layers` values per grid cell, cell-major.
//! - `Sparse`: values for selected cells only, cell-major, with a sorted
//!   position list mapping each ordinal back to its `(row, col)`.

use crate::cell::CellValue;
use serde::{Deserialize, Serialize};

/// A `(row, col)` cell address. Ordering is row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

impl CellPos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Build from a row-major index in a grid with `cols` columns.
    pub fn from_index(index: usize, cols: usize) -> Self {
        Self {
            row: index / cols,
            col: index % cols,
        }
    }

    /// Row-major index in a grid with `cols` columns.
    pub fn index(&self, cols: usize) -> usize {
        self.row * cols + self.col
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Storage<T> {
    Dense1D(Vec<T>),
    Dense2D {
        values: Vec<T>,
        layers: usize,
    },
    Sparse {
        values: Vec<T>,
        layers: usize,
        positions: Vec<CellPos>,
    },
}

impl<T: CellValue> Storage<T> {
    /// Pack per-layer, row-major buffers into a dense layout.
    ///
    /// All layers must have the same length.
    pub(crate) fn from_layers(mut layers: Vec<Vec<T>>) -> Self {
        if layers.len() == 1 {
            return Storage::Dense1D(layers.pop().unwrap_or_default());
        }
        let count = layers.len();
        let cells = layers.first().map_or(0, Vec::len);
        let mut values = Vec::with_capacity(cells * count);
        for cell in 0..cells {
            for layer in &layers {
                values.push(layer[cell]);
            }
        }
        Storage::Dense2D {
            values,
            layers: count,
        }
    }

    pub fn layers(&self) -> usize {
        match self {
            Storage::Dense1D(_) => 1,
            Storage::Dense2D { layers, .. } | Storage::Sparse { layers, .. } => *layers,
        }
    }

    /// Number of addressable slots (cells for dense, positions for sparse).
    pub fn data_length(&self) -> usize {
        match self {
            Storage::Dense1D(values) => values.len(),
            Storage::Dense2D { values, layers } => values.len() / (*layers).max(1),
            Storage::Sparse { positions, .. } => positions.len(),
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Storage::Sparse { .. })
    }

    pub fn values(&self) -> &[T] {
        match self {
            Storage::Dense1D(values)
            | Storage::Dense2D { values, .. }
            | Storage::Sparse { values, .. } => values,
        }
    }

    pub fn positions(&self) -> Option<&[CellPos]> {
        match self {
            Storage::Sparse { positions, .. } => Some(positions),
            _ => None,
        }
    }

    pub fn value(&self, slot: usize, layer: usize) -> Option<T> {
        let layers = self.layers();
        if layer >= layers || slot >= self.data_length() {
            return None;
        }
        self.values().get(slot * layers + layer).copied()
    }

    pub fn set(&mut self, slot: usize, layer: usize, value: T) -> bool {
        let layers = self.layers();
        if layer >= layers || slot >= self.data_length() {
            return false;
        }
        let values = match self {
            Storage::Dense1D(values)
            | Storage::Dense2D { values, .. }
            | Storage::Sparse { values, .. } => values,
        };
        values[slot * layers + layer] = value;
        true
    }

    /// Iterate the values of one layer in slot order.
    pub fn layer_iter(&self, layer: usize) -> impl Iterator<Item = T> + '_ {
        let layers = self.layers();
        let take = if layer < layers { self.data_length() } else { 0 };
        self.values()
            .iter()
            .skip(layer)
            .step_by(layers)
            .take(take)
            .copied()
    }

    /// Slot of a grid cell, or `None` when the cell is not stored.
    pub fn slot_of(&self, pos: CellPos, cols: usize) -> Option<usize> {
        match self {
            Storage::Sparse { positions, .. } => positions.binary_search(&pos).ok(),
            _ => {
                let index = pos.index(cols);
                (index < self.data_length()).then_some(index)
            }
        }
    }

    /// Expand to per-layer, row-major buffers over a grid of `cell_count` cells.
    pub fn to_dense_layers(&self, cell_count: usize, cols: usize, nodata: T) -> Vec<Vec<T>> {
        let layers = self.layers();
        match self {
            Storage::Dense1D(values) => vec![values.clone()],
            Storage::Dense2D { .. } => (0..layers).map(|l| self.layer_iter(l).collect()).collect(),
            Storage::Sparse {
                values, positions, ..
            } => {
                let mut out = vec![vec![nodata; cell_count]; layers];
                for (ordinal, pos) in positions.iter().enumerate() {
                    let index = pos.index(cols);
                    for (layer, buf) in out.iter_mut().enumerate() {
                        buf[index] = values[ordinal * layers + layer];
                    }
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_layers_single_is_dense1d() {
        let storage = Storage::from_layers(vec![vec![1, 2, 3]]);
        assert_eq!(storage, Storage::Dense1D(vec![1, 2, 3]));
        assert_eq!(storage.layers(), 1);
        assert_eq!(storage.data_length(), 3);
    }

    #[test]
    fn test_from_layers_interleaves() {
        let storage = Storage::from_layers(vec![vec![1, 2, 3], vec![10, 20, 30]]);
        assert_eq!(storage.values(), &[1, 10, 2, 20, 3, 30]);
        assert_eq!(storage.data_length(), 3);
        assert_eq!(storage.value(1, 1), Some(20));
        assert_eq!(storage.layer_iter(1).collect::<Vec<_>>(), vec![10, 20, 30]);
    }

    #[test]
    fn test_value_out_of_range() {
        let storage = Storage::from_layers(vec![vec![1.0f32, 2.0]]);
        assert_eq!(storage.value(2, 0), None);
        assert_eq!(storage.value(0, 1), None);
    }

    #[test]
    fn test_set_value() {
        let mut storage = Storage::from_layers(vec![vec![1, 2], vec![3, 4]]);
        assert!(storage.set(1, 1, 9));
        assert!(!storage.set(2, 0, 9));
        assert_eq!(storage.value(1, 1), Some(9));
    }

    #[test]
    fn test_sparse_slot_lookup_and_expand() {
        let storage = Storage::Sparse {
            values: vec![4, 5],
            layers: 1,
            positions: vec![CellPos::new(0, 1), CellPos::new(1, 0)],
        };
        assert_eq!(storage.slot_of(CellPos::new(1, 0), 2), Some(1));
        assert_eq!(storage.slot_of(CellPos::new(0, 0), 2), None);
        assert_eq!(
            storage.to_dense_layers(4, 2, -1),
            vec![vec![-1, 4, 5, -1]]
        );
    }

    #[test]
    fn test_cell_pos_index_round_trip() {
        let pos = CellPos::from_index(17, 7);
        assert_eq!(pos, CellPos::new(2, 3));
        assert_eq!(pos.index(7), 17);
        assert!(CellPos::new(0, 6) < CellPos::new(1, 0));
    }
}
