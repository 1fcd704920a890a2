//! Applying a mask to an input grid.

use super::MaskRaster;
use crate::cell::CellValue;
use crate::error::{RasterError, RasterResult};
use crate::header::RasterHeader;
use crate::raster::{CellPos, Storage};
use rayon::prelude::*;

/// Integer shift from one grid's cells to another's.
///
/// Cell `(r, c)` of the source grid sits on cell `(r + row, c + col)` of the
/// target grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridOffset {
    pub row: i64,
    pub col: i64,
}

impl GridOffset {
    /// Offset from `source` cells to `target` cells.
    ///
    /// # Errors
    ///
    /// `RasterError::Geometry` when the cell sizes differ by more than a
    /// relative 1e-6.
    pub fn between(source: &RasterHeader, target: &RasterHeader) -> RasterResult<Self> {
        let (a, b) = (source.cell_width(), target.cell_width());
        if (a - b).abs() > 1e-6 * a.max(b) {
            return Err(RasterError::Geometry(format!(
                "cell size mismatch: mask {a} vs input {b}"
            )));
        }
        Ok(Self {
            row: ((target.top_center() - source.top_center()) / b).round() as i64,
            col: ((source.xll_center() - target.xll_center()) / b).round() as i64,
        })
    }

    /// Target cell for `pos`, or `None` if it falls outside a
    /// `rows` x `cols` target grid.
    pub fn apply(&self, pos: CellPos, rows: usize, cols: usize) -> Option<CellPos> {
        let row = pos.row as i64 + self.row;
        let col = pos.col as i64 + self.col;
        if row < 0 || col < 0 || row >= rows as i64 || col >= cols as i64 {
            return None;
        }
        Some(CellPos::new(row as usize, col as usize))
    }

    pub(crate) fn shifted(self, row: i64, col: i64) -> Self {
        Self {
            row: self.row + row,
            col: self.col + col,
        }
    }
}

pub(crate) struct MaskParams<T> {
    pub calc_positions: bool,
    pub use_mask_extent: bool,
    pub default_value: T,
}

/// A masked grid and the offset from mask cells to its cells.
pub(crate) struct Masked<T> {
    pub header: RasterHeader,
    pub storage: Storage<T>,
    pub offset: GridOffset,
}

/// Keep the cells of `layers` selected by `mask`.
///
/// Mask-valid cells whose input is nodata, or that fall outside the input,
/// take `default_value`. With `use_mask_extent` the output adopts the
/// mask's grid; otherwise it is the tight box around the mask-valid cells
/// that lie inside the input.
pub(crate) fn apply_mask<T: CellValue>(
    header: &RasterHeader,
    layers: &[Vec<T>],
    mask: &MaskRaster,
    params: &MaskParams<T>,
) -> RasterResult<Masked<T>> {
    let offset = GridOffset::between(mask.header(), header)?;
    let (rows, cols) = (header.rows(), header.cols());
    let positions = mask.positions();

    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for pos in positions {
        if let Some(p) = offset.apply(*pos, rows, cols) {
            bounds = Some(match bounds {
                None => (p.row, p.row, p.col, p.col),
                Some((r0, r1, c0, c1)) => (r0.min(p.row), r1.max(p.row), c0.min(p.col), c1.max(p.col)),
            });
        }
    }
    let Some((r0, r1, c0, c1)) = bounds else {
        return Err(RasterError::Geometry(
            "mask and input do not overlap".into(),
        ));
    };

    let (out_header, out_offset, selected): (RasterHeader, GridOffset, Vec<CellPos>) =
        if params.use_mask_extent {
            let m = mask.header();
            (
                header.with_extent(m.rows(), m.cols(), m.xll_center(), m.yll_center()),
                GridOffset::default(),
                positions.to_vec(),
            )
        } else {
            (
                header.window(r0, r1, c0, c1),
                offset.shifted(-(r0 as i64), -(c0 as i64)),
                positions
                    .iter()
                    .filter(|p| offset.apply(**p, rows, cols).is_some())
                    .copied()
                    .collect(),
            )
        };

    let nodata = T::from_f64(header.nodata());
    let n_layers = layers.len();
    let values: Vec<T> = selected
        .par_iter()
        .flat_map_iter(|pos| {
            let source = offset.apply(*pos, rows, cols);
            (0..n_layers).map(move |layer| match source {
                Some(p) => {
                    let v = layers[layer][p.index(cols)];
                    if v.same_as(nodata) {
                        params.default_value
                    } else {
                        v
                    }
                }
                None => params.default_value,
            })
        })
        .collect();

    let (out_rows, out_cols) = (out_header.rows(), out_header.cols());
    let out_positions = selected
        .iter()
        .map(|pos| out_offset.apply(*pos, out_rows, out_cols))
        .collect::<Option<Vec<CellPos>>>()
        .ok_or_else(|| RasterError::Geometry("masked cell outside output extent".into()))?;
    let selected_count = out_positions.len();

    let storage = if params.calc_positions {
        Storage::Sparse {
            values,
            layers: n_layers,
            positions: out_positions,
        }
    } else {
        let mut dense = vec![vec![nodata; out_header.cell_count()]; n_layers];
        for (ordinal, pos) in out_positions.iter().enumerate() {
            let index = pos.index(out_cols);
            for (layer, buf) in dense.iter_mut().enumerate() {
                buf[index] = values[ordinal * n_layers + layer];
            }
        }
        Storage::from_layers(dense)
    };

    tracing::debug!(
        selected = selected_count,
        rows = out_rows,
        cols = out_cols,
        use_mask_extent = params.use_mask_extent,
        sparse = params.calc_positions,
        "Applied mask"
    );

    Ok(Masked {
        header: out_header,
        storage,
        offset: out_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(rows: usize, cols: usize, xll: f64, yll: f64) -> RasterHeader {
        RasterHeader::new(rows, cols, 2.0, xll, yll, -9999.0).unwrap()
    }

    #[test]
    fn test_offset_between() {
        let mask = header(2, 2, 3.0, 3.0);
        let input = header(4, 3, 1.0, 1.0);
        let offset = GridOffset::between(&mask, &input).unwrap();
        assert_eq!(offset, GridOffset { row: 1, col: 1 });
        assert_eq!(
            offset.apply(CellPos::new(1, 0), 4, 3),
            Some(CellPos::new(2, 1))
        );
        assert_eq!(offset.apply(CellPos::new(3, 0), 4, 3), None);
    }

    #[test]
    fn test_offset_cell_size_mismatch() {
        let mask = header(2, 2, 3.0, 3.0);
        let input = RasterHeader::new(4, 3, 2.5, 1.0, 1.0, -9999.0).unwrap();
        assert!(matches!(
            GridOffset::between(&mask, &input),
            Err(RasterError::Geometry(_))
        ));
    }

    #[test]
    fn test_offset_negative() {
        let mask = header(4, 3, 1.0, 1.0);
        let input = header(2, 2, 3.0, 3.0);
        let offset = GridOffset::between(&mask, &input).unwrap();
        assert_eq!(offset, GridOffset { row: -1, col: -1 });
        assert_eq!(offset.apply(CellPos::new(0, 0), 2, 2), None);
        assert_eq!(
            offset.apply(CellPos::new(2, 2), 2, 2),
            Some(CellPos::new(1, 1))
        );
    }
}
