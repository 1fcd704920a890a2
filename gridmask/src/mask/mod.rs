//! Mask rasters and the masking engine.
//!
//! A [`MaskRaster`] is an integer raster whose non-nodata cells select the
//! cells kept from other rasters. Its cell values double as group ids for
//! partitioning (see [`build_subset`](MaskRaster::build_subset)).
//!
//! The mask is shared read-only between every raster masked by it, so it
//! is normally wrapped in an `Arc` once its subsets are built. The list of
//! valid positions is computed lazily on first use and cached.

pub(crate) mod engine;
mod partition;

pub use engine::GridOffset;

use crate::error::{RasterError, RasterResult};
use crate::header::RasterHeader;
use crate::raster::{CellPos, Raster, RasterOptions};
use crate::subset::SubsetPositions;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

/// An integer mask raster with a lazily built position index.
#[derive(Debug, Clone)]
pub struct MaskRaster {
    raster: Raster<i32>,
    header: RasterHeader,
    index: OnceLock<Vec<CellPos>>,
    subsets: BTreeMap<i32, SubsetPositions>,
}

impl MaskRaster {
    /// Read a mask from a raster file.
    pub fn open(path: impl AsRef<Path>) -> RasterResult<Self> {
        Self::from_raster(Raster::open(path, &RasterOptions::default())?)
    }

    /// Wrap an already loaded raster.
    ///
    /// # Errors
    ///
    /// `RasterError::State` for a blank raster, `RasterError::Format` for a
    /// raster with more than one layer.
    pub fn from_raster(raster: Raster<i32>) -> RasterResult<Self> {
        let Some(header) = raster.header().cloned() else {
            return Err(RasterError::State("mask raster is blank".into()));
        };
        if header.layers() != 1 {
            return Err(RasterError::Format(format!(
                "mask must have a single layer, got {}",
                header.layers()
            )));
        }
        Ok(Self {
            raster,
            header,
            index: OnceLock::new(),
            subsets: BTreeMap::new(),
        })
    }

    pub fn raster(&self) -> &Raster<i32> {
        &self.raster
    }

    pub fn header(&self) -> &RasterHeader {
        &self.header
    }

    pub fn core_name(&self) -> &str {
        self.raster.core_name()
    }

    /// Valid (non-nodata) cells in row-major order.
    pub fn positions(&self) -> &[CellPos] {
        self.index.get_or_init(|| {
            let positions = self.raster.valid_positions();
            tracing::debug!(
                core = self.core_name(),
                valid = positions.len(),
                "Indexed mask positions"
            );
            positions
        })
    }

    pub fn positions_calculated(&self) -> bool {
        self.index.get().is_some()
    }

    pub fn valid_count(&self) -> usize {
        self.positions().len()
    }

    /// Raw mask value (group id) at `pos`.
    pub fn group_of(&self, pos: CellPos) -> i32 {
        self.raster.get_value(pos.row as i64, pos.col as i64)
    }

    pub fn subsets(&self) -> &BTreeMap<i32, SubsetPositions> {
        &self.subsets
    }

    pub fn subset(&self, group: i32) -> Option<&SubsetPositions> {
        self.subsets.get(&group)
    }

    pub fn subset_mut(&mut self, group: i32) -> Option<&mut SubsetPositions> {
        self.subsets.get_mut(&group)
    }
}
