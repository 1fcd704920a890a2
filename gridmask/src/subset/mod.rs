//! Subsets: groups of grid cells sharing a mask group id.
//!
//! A [`SubsetPositions`] records, for one group, the sorted row-major
//! indices of its cells in the mask grid, the bounding box of those cells
//! and each cell's position inside that box. It also carries one value per
//! cell and layer so a group can be processed on its own and later
//! scattered back into the full grid.

mod output;

pub(crate) use output::{merge_subsets, write_subset_blobs, write_subset_tiles};

use crate::cell::NODATA_VALUE;
use crate::error::{RasterError, RasterResult};
use crate::header::RasterHeader;
use crate::io::blob::{self, BlobPayload, BlobStore, SubsetBlob};
use crate::raster::CellPos;
use serde::{Deserialize, Serialize};

/// Inclusive row and column range of a subset in the full grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetBounds {
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
}

impl SubsetBounds {
    fn of(pos: CellPos) -> Self {
        Self {
            start_row: pos.row,
            end_row: pos.row,
            start_col: pos.col,
            end_col: pos.col,
        }
    }

    fn include(&mut self, pos: CellPos) {
        self.start_row = self.start_row.min(pos.row);
        self.end_row = self.end_row.max(pos.row);
        self.start_col = self.start_col.min(pos.col);
        self.end_col = self.end_col.max(pos.col);
    }

    pub fn rows(&self) -> usize {
        self.end_row - self.start_row + 1
    }

    pub fn cols(&self) -> usize {
        self.end_col - self.start_col + 1
    }

    pub fn cell_count(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn contains(&self, pos: CellPos) -> bool {
        (self.start_row..=self.end_row).contains(&pos.row)
            && (self.start_col..=self.end_col).contains(&pos.col)
    }
}

/// One cell of a subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsetCell {
    /// Row-major index in the full grid.
    pub global_index: usize,
    pub local_row: usize,
    pub local_col: usize,
}

/// Cells and values of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetPositions {
    group: i32,
    bounds: SubsetBounds,
    cells: Vec<SubsetCell>,
    layers: usize,
    /// `cells.len() * layers` values, cell-major.
    data: Vec<f64>,
    data_assigned: bool,
}

impl SubsetPositions {
    /// Build a subset from row-major indices in a grid with `grid_cols`
    /// columns. Indices are sorted and deduplicated; returns `None` for an
    /// empty list.
    pub fn new(group: i32, mut global: Vec<usize>, grid_cols: usize) -> Option<Self> {
        if grid_cols == 0 {
            return None;
        }
        global.sort_unstable();
        global.dedup();

        let first = CellPos::from_index(*global.first()?, grid_cols);
        let mut bounds = SubsetBounds::of(first);
        for &index in &global[1..] {
            bounds.include(CellPos::from_index(index, grid_cols));
        }

        let cells: Vec<SubsetCell> = global
            .into_iter()
            .map(|index| {
                let pos = CellPos::from_index(index, grid_cols);
                SubsetCell {
                    global_index: index,
                    local_row: pos.row - bounds.start_row,
                    local_col: pos.col - bounds.start_col,
                }
            })
            .collect();
        let n = cells.len();

        Some(Self {
            group,
            bounds,
            cells,
            layers: 1,
            data: vec![NODATA_VALUE; n],
            data_assigned: false,
        })
    }

    pub fn group(&self) -> i32 {
        self.group
    }

    pub fn bounds(&self) -> SubsetBounds {
        self.bounds
    }

    pub fn cells(&self) -> &[SubsetCell] {
        &self.cells
    }

    /// Number of cells in the group.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn global_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells.iter().map(|c| c.global_index)
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Whether values were assigned since the subset was (re)built.
    pub fn has_data(&self) -> bool {
        self.data_assigned
    }

    pub fn value(&self, ordinal: usize, layer: usize) -> Option<f64> {
        if layer >= self.layers || ordinal >= self.cells.len() {
            return None;
        }
        self.data.get(ordinal * self.layers + layer).copied()
    }

    /// Assign single-layer values, one per cell in index order.
    pub fn set_data(&mut self, values: &[f64]) -> RasterResult<()> {
        self.set_layered_data(values, 1)
    }

    /// Assign `layers` values per cell, cell-major.
    pub fn set_layered_data(&mut self, values: &[f64], layers: usize) -> RasterResult<()> {
        let layers = layers.max(1);
        let expected = self.cells.len() * layers;
        if values.len() != expected {
            return Err(RasterError::SizeMismatch {
                expected,
                actual: values.len(),
            });
        }
        self.data = values.to_vec();
        self.layers = layers;
        self.data_assigned = true;
        Ok(())
    }

    pub(crate) fn assign(&mut self, data: Vec<f64>, layers: usize) {
        debug_assert!(layers > 0 && data.len() == self.cells.len() * layers);
        self.data = data;
        self.layers = layers;
        self.data_assigned = true;
    }

    /// Drop assigned values, leaving nodata.
    pub fn clear_data(&mut self) {
        self.data = vec![NODATA_VALUE; self.cells.len()];
        self.layers = 1;
        self.data_assigned = false;
    }

    /// Header of this subset's tile inside `grid`.
    pub fn tile_header(&self, grid: &RasterHeader) -> RasterHeader {
        let b = self.bounds;
        grid.window(b.start_row, b.end_row, b.start_col, b.end_col)
            .with_layers(self.layers)
    }

    /// Per-layer, row-major tile buffers; cells outside the group hold `nodata`.
    pub fn tile_layers(&self, nodata: f64) -> Vec<Vec<f64>> {
        let cols = self.bounds.cols();
        let mut tiles = vec![vec![nodata; self.bounds.cell_count()]; self.layers];
        for (ordinal, cell) in self.cells.iter().enumerate() {
            let index = cell.local_row * cols + cell.local_col;
            for (layer, tile) in tiles.iter_mut().enumerate() {
                tile[index] = self.data[ordinal * self.layers + layer];
            }
        }
        tiles
    }

    pub(crate) fn to_blob(&self, grid: &RasterHeader, full: bool) -> SubsetBlob {
        let header = self.tile_header(grid);
        let payload = if full {
            BlobPayload::Full {
                layers: self.tile_layers(grid.nodata()),
            }
        } else {
            BlobPayload::Valid {
                positions: self
                    .cells
                    .iter()
                    .map(|c| CellPos::new(c.local_row, c.local_col))
                    .collect(),
                layers: self.layers,
                values: self.data.clone(),
            }
        };
        SubsetBlob {
            group: self.group,
            header,
            bounds: self.bounds,
            payload,
        }
    }

    /// Persist this subset under `name`. `full` stores the whole tile,
    /// otherwise only the group's cells.
    pub fn write_blob(
        &self,
        store: &dyn BlobStore,
        name: &str,
        grid: &RasterHeader,
        full: bool,
    ) -> RasterResult<()> {
        let bytes = blob::encode(name, &self.to_blob(grid, full))?;
        store.write_blob(name, bytes)
    }

    /// Load values written by [`write_blob`](Self::write_blob).
    ///
    /// # Errors
    ///
    /// `RasterError::Geometry` if the blob's extent or cells differ from
    /// this subset's.
    pub fn read_blob(&mut self, store: &dyn BlobStore, name: &str) -> RasterResult<()> {
        let blob: SubsetBlob = blob::decode(name, &store.read_blob(name)?)?;
        if blob.bounds != self.bounds {
            return Err(RasterError::Geometry(format!(
                "blob '{name}' covers a different extent than group {}",
                self.group
            )));
        }
        match blob.payload {
            BlobPayload::Full { layers } => {
                let cols = self.bounds.cols();
                let expected = self.bounds.cell_count();
                if layers.is_empty() {
                    return Err(RasterError::SizeMismatch {
                        expected,
                        actual: 0,
                    });
                }
                if let Some(bad) = layers.iter().find(|l| l.len() != expected) {
                    return Err(RasterError::SizeMismatch {
                        expected,
                        actual: bad.len(),
                    });
                }
                let count = layers.len();
                let data = self
                    .cells
                    .iter()
                    .flat_map(|c| {
                        let index = c.local_row * cols + c.local_col;
                        layers.iter().map(move |tile| tile[index])
                    })
                    .collect();
                self.assign(data, count);
                Ok(())
            }
            BlobPayload::Valid {
                positions,
                layers,
                values,
            } => {
                let same_cells = positions.len() == self.cells.len()
                    && positions
                        .iter()
                        .zip(&self.cells)
                        .all(|(p, c)| p.row == c.local_row && p.col == c.local_col);
                if !same_cells {
                    return Err(RasterError::Geometry(format!(
                        "blob '{name}' holds different cells than group {}",
                        self.group
                    )));
                }
                self.set_layered_data(&values, layers)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryBlobStore;

    // 4 x 7 grid, group 1 of the split fixture
    fn group_one() -> SubsetPositions {
        SubsetPositions::new(1, vec![14, 0, 2, 3, 7, 8, 9], 7).unwrap()
    }

    fn grid() -> RasterHeader {
        RasterHeader::new(4, 7, 2.0, 1.0, 1.0, NODATA_VALUE).unwrap()
    }

    #[test]
    fn test_new_sorts_and_bounds() {
        let subset = group_one();
        assert_eq!(
            subset.global_indices().collect::<Vec<_>>(),
            vec![0, 2, 3, 7, 8, 9, 14]
        );
        assert_eq!(
            subset.bounds(),
            SubsetBounds {
                start_row: 0,
                end_row: 2,
                start_col: 0,
                end_col: 3
            }
        );
        assert_eq!(subset.cell_count(), 7);
        assert!(!subset.has_data());
        let last = subset.cells()[6];
        assert_eq!((last.local_row, last.local_col), (2, 0));
    }

    #[test]
    fn test_new_empty_is_none() {
        assert!(SubsetPositions::new(1, vec![], 7).is_none());
        assert!(SubsetPositions::new(1, vec![3], 0).is_none());
    }

    #[test]
    fn test_set_data_checks_length() {
        let mut subset = group_one();
        let err = subset.set_data(&[1.0; 6]).unwrap_err();
        assert!(matches!(
            err,
            RasterError::SizeMismatch {
                expected: 7,
                actual: 6
            }
        ));
        subset.set_data(&[1.0; 7]).unwrap();
        assert!(subset.has_data());
        assert_eq!(subset.value(6, 0), Some(1.0));
        assert_eq!(subset.value(7, 0), None);
    }

    #[test]
    fn test_tile_layers_and_header() {
        let mut subset = group_one();
        subset
            .set_data(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0])
            .unwrap();
        let tile = subset.tile_layers(-1.0);
        assert_eq!(
            tile,
            vec![vec![
                1.0, -1.0, 2.0, 3.0, //
                4.0, 5.0, 6.0, -1.0, //
                7.0, -1.0, -1.0, -1.0,
            ]]
        );

        let header = subset.tile_header(&grid());
        assert_eq!(header.rows(), 3);
        assert_eq!(header.cols(), 4);
        assert_eq!(header.xll_center(), 1.0);
        assert_eq!(header.yll_center(), 3.0);
    }

    #[test]
    fn test_blob_round_trip_valid_and_full() {
        let store = MemoryBlobStore::new();
        let mut source = group_one();
        source
            .set_data(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0])
            .unwrap();

        for full in [false, true] {
            source.write_blob(&store, "g1", &grid(), full).unwrap();
            let mut target = group_one();
            target.read_blob(&store, "g1").unwrap();
            assert_eq!(target.data(), source.data());
            assert!(target.has_data());
        }
    }

    #[test]
    fn test_blob_without_layers_is_rejected() {
        let store = MemoryBlobStore::new();
        let source = group_one();
        let empty = SubsetBlob {
            group: 1,
            header: source.tile_header(&grid()),
            bounds: source.bounds(),
            payload: BlobPayload::Full { layers: vec![] },
        };
        store
            .write_blob("g1", blob::encode("g1", &empty).unwrap())
            .unwrap();

        let mut target = group_one();
        assert!(matches!(
            target.read_blob(&store, "g1"),
            Err(RasterError::SizeMismatch {
                expected: 12,
                actual: 0
            })
        ));
        assert!(!target.has_data());
        assert_eq!(target.tile_layers(-1.0).len(), 1);
    }

    #[test]
    fn test_blob_valid_payload_length_mismatch() {
        let store = MemoryBlobStore::new();
        let source = group_one();
        let short = SubsetBlob {
            group: 1,
            header: source.tile_header(&grid()),
            bounds: source.bounds(),
            payload: BlobPayload::Valid {
                positions: source
                    .cells()
                    .iter()
                    .map(|c| CellPos::new(c.local_row, c.local_col))
                    .collect(),
                layers: 2,
                values: vec![1.0; 7],
            },
        };
        store
            .write_blob("g1", blob::encode("g1", &short).unwrap())
            .unwrap();

        let mut target = group_one();
        assert!(matches!(
            target.read_blob(&store, "g1"),
            Err(RasterError::SizeMismatch {
                expected: 14,
                actual: 7
            })
        ));
    }

    #[test]
    fn test_blob_extent_mismatch() {
        let store = MemoryBlobStore::new();
        group_one().write_blob(&store, "g1", &grid(), false).unwrap();
        let mut other = SubsetPositions::new(2, vec![4, 5, 10, 15], 7).unwrap();
        assert!(matches!(
            other.read_blob(&store, "g1"),
            Err(RasterError::Geometry(_))
        ));
    }
}
