//! Raster header model.
//!
//! A [`RasterHeader`] describes grid geometry: dimensions, a square cell
//! size and the center coordinates of the lower-left cell. Row 0 is the
//! northernmost row, so the center of cell `(row, col)` is
//! `(xll + col * cs, yll + (rows - 1 - row) * cs)`.

use crate::error::{RasterError, RasterResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Geometry and metadata shared by every raster representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterHeader {
    rows: usize,
    cols: usize,
    cell_width: f64,
    xll_center: f64,
    yll_center: f64,
    layers: usize,
    nodata: f64,
    srs: String,
    metadata: BTreeMap<String, f64>,
}

impl RasterHeader {
    /// Create a single-layer header.
    ///
    /// # Errors
    ///
    /// Returns `RasterError::Format` when a dimension is zero or the cell
    /// size is not a positive finite number.
    pub fn new(
        rows: usize,
        cols: usize,
        cell_width: f64,
        xll_center: f64,
        yll_center: f64,
        nodata: f64,
    ) -> RasterResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(RasterError::Format(format!(
                "grid dimensions must be positive, got {rows}x{cols}"
            )));
        }
        if !(cell_width.is_finite() && cell_width > 0.0) {
            return Err(RasterError::Format(format!(
                "cell size must be positive, got {cell_width}"
            )));
        }
        Ok(Self {
            rows,
            cols,
            cell_width,
            xll_center,
            yll_center,
            layers: 1,
            nodata,
            srs: String::new(),
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_layers(mut self, layers: usize) -> Self {
        self.layers = layers.max(1);
        self
    }

    pub fn with_srs(mut self, srs: impl Into<String>) -> Self {
        self.srs = srs.into();
        self
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    pub fn xll_center(&self) -> f64 {
        self.xll_center
    }

    pub fn yll_center(&self) -> f64 {
        self.yll_center
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    pub fn srs(&self) -> &str {
        &self.srs
    }

    pub fn metadata(&self) -> &BTreeMap<String, f64> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: f64) {
        self.metadata.insert(key.into(), value);
    }

    /// Number of cells in the full grid (`rows * cols`).
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Western edge of the grid.
    pub fn x_min(&self) -> f64 {
        self.xll_center - 0.5 * self.cell_width
    }

    /// Northern edge of the grid.
    pub fn y_max(&self) -> f64 {
        self.yll_center + (self.rows as f64 - 0.5) * self.cell_width
    }

    /// Center y of row 0.
    pub fn top_center(&self) -> f64 {
        self.yll_center + (self.rows as f64 - 1.0) * self.cell_width
    }

    /// Locate the cell containing `(x, y)`, if any.
    ///
    /// Cells are half-open: the western and northern edges belong to the
    /// cell, the eastern and southern edges to the neighbour.
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.x_min()) / self.cell_width).floor();
        let row = ((self.y_max() - y) / self.cell_width).floor();
        if !(col.is_finite() && row.is_finite()) || col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        if row >= self.rows || col >= self.cols {
            return None;
        }
        Some((row, col))
    }

    /// Header for a window of this grid, keeping nodata, SRS, layers and metadata.
    pub(crate) fn with_extent(
        &self,
        rows: usize,
        cols: usize,
        xll_center: f64,
        yll_center: f64,
    ) -> Self {
        Self {
            rows,
            cols,
            xll_center,
            yll_center,
            ..self.clone()
        }
    }

    /// Header of the window spanning rows `start_row..=end_row` and
    /// columns `start_col..=end_col`.
    pub(crate) fn window(
        &self,
        start_row: usize,
        end_row: usize,
        start_col: usize,
        end_col: usize,
    ) -> Self {
        let cs = self.cell_width;
        self.with_extent(
            end_row - start_row + 1,
            end_col - start_col + 1,
            self.xll_center + start_col as f64 * cs,
            self.yll_center + (self.rows - 1 - end_row) as f64 * cs,
        )
    }

    /// Whether two headers describe the same grid geometry.
    pub fn same_grid(&self, other: &RasterHeader) -> bool {
        let tol = 1e-6 * self.cell_width.max(other.cell_width);
        self.rows == other.rows
            && self.cols == other.cols
            && (self.cell_width - other.cell_width).abs() <= tol
            && (self.xll_center - other.xll_center).abs() <= tol
            && (self.yll_center - other.yll_center).abs() <= tol
    }

    /// Header values as a flat numeric map, metadata included.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = self.metadata.clone();
        map.insert("NROWS".into(), self.rows as f64);
        map.insert("NCOLS".into(), self.cols as f64);
        map.insert("XLLCENTER".into(), self.xll_center);
        map.insert("YLLCENTER".into(), self.yll_center);
        map.insert("CELLSIZE".into(), self.cell_width);
        map.insert("NODATA_VALUE".into(), self.nodata);
        map.insert("LAYERS".into(), self.layers as f64);
        map.insert("CELLSNUM".into(), self.cell_count() as f64);
        map
    }
}

/// Parse the six-line header block of an ASCII grid.
///
/// Accepts `NCOLS`, `NROWS`, `XLLCENTER` or `XLLCORNER`, `YLLCENTER` or
/// `YLLCORNER`, `CELLSIZE` and `NODATA_VALUE` in any order and any case.
/// Corner coordinates are shifted by half a cell to centers.
pub fn parse_ascii_header<'a, I>(lines: I) -> RasterResult<RasterHeader>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ncols = None;
    let mut nrows = None;
    let mut xll = None;
    let mut yll = None;
    let mut cellsize = None;
    let mut nodata = None;

    let mut seen = 0;
    for line in lines {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(raw), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(RasterError::Format(format!(
                "expected 'KEYWORD value' header line, got '{}'",
                line.trim()
            )));
        };
        let value: f64 = raw.parse().map_err(|_| {
            RasterError::Format(format!("invalid header value '{raw}' for {key}"))
        })?;
        let slot = match key.to_ascii_uppercase().as_str() {
            "NCOLS" => &mut ncols,
            "NROWS" => &mut nrows,
            "XLLCENTER" => {
                xll = Some((value, false));
                seen += 1;
                continue;
            }
            "XLLCORNER" => {
                xll = Some((value, true));
                seen += 1;
                continue;
            }
            "YLLCENTER" => {
                yll = Some((value, false));
                seen += 1;
                continue;
            }
            "YLLCORNER" => {
                yll = Some((value, true));
                seen += 1;
                continue;
            }
            "CELLSIZE" => &mut cellsize,
            "NODATA_VALUE" => &mut nodata,
            other => {
                return Err(RasterError::Format(format!(
                    "unknown header keyword '{other}'"
                )))
            }
        };
        *slot = Some(value);
        seen += 1;
    }

    let (Some(ncols), Some(nrows), Some(xll), Some(yll), Some(cellsize), Some(nodata)) =
        (ncols, nrows, xll, yll, cellsize, nodata)
    else {
        return Err(RasterError::Format(
            "ASCII grid header must define NCOLS, NROWS, XLL*, YLL*, CELLSIZE and NODATA_VALUE"
                .into(),
        ));
    };
    if seen != 6 {
        return Err(RasterError::Format(format!(
            "ASCII grid header has {seen} keywords, expected 6"
        )));
    }
    if ncols.fract() != 0.0 || nrows.fract() != 0.0 || ncols < 0.0 || nrows < 0.0 {
        return Err(RasterError::Format(format!(
            "grid dimensions must be whole numbers, got {nrows}x{ncols}"
        )));
    }

    let half = 0.5 * cellsize;
    let shift = |(v, corner): (f64, bool)| if corner { v + half } else { v };
    RasterHeader::new(
        nrows as usize,
        ncols as usize,
        cellsize,
        shift(xll),
        shift(yll),
        nodata,
    )
}
