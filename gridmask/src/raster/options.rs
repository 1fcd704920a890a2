//! Construction options for [`Raster`](super::Raster).

use crate::cell::{DataType, NODATA_VALUE};
use crate::mask::MaskRaster;
use std::sync::Arc;

/// How a raster is materialized when it is read.
///
/// Built with `with_*` methods:
///
/// ```ignore
/// let options = RasterOptions::new()
///     .with_mask(Arc::clone(&mask))
///     .with_mask_extent(false)
///     .with_positions(true);
/// ```
#[derive(Debug, Clone)]
pub struct RasterOptions {
    /// Store only selected cells (sparse layout) right after reading.
    pub calc_positions: bool,

    /// Mask whose valid cells select the cells kept from the input.
    pub mask: Option<Arc<MaskRaster>>,

    /// Adopt the mask's full grid instead of the tight overlap extent.
    pub use_mask_extent: bool,

    /// Fill for mask-valid cells that are nodata or outside the input.
    pub default_value: f64,

    /// Element type used when writing, `None` keeps the cell type.
    pub out_type: Option<DataType>,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            calc_positions: false,
            mask: None,
            use_mask_extent: true,
            default_value: NODATA_VALUE,
            out_type: None,
        }
    }
}

impl RasterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positions(mut self, calc_positions: bool) -> Self {
        self.calc_positions = calc_positions;
        self
    }

    pub fn with_mask(mut self, mask: Arc<MaskRaster>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_mask_extent(mut self, use_mask_extent: bool) -> Self {
        self.use_mask_extent = use_mask_extent;
        self
    }

    pub fn with_default_value(mut self, default_value: f64) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn with_out_type(mut self, out_type: Option<DataType>) -> Self {
        self.out_type = out_type;
        self
    }
}
