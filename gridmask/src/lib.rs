//! GridMask - Typed rasters with mask-driven split and merge
//!
//! This library reads gridded rasters (ESRI ASCII grids and GeoTIFF), keeps
//! only the cells selected by an integer mask, partitions masked cells into
//! groups by mask value, and merges per-group results back onto the full
//! grid.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//! use gridmask::{MaskRaster, Raster, RasterOptions};
//!
//! let mut mask = MaskRaster::open("watershed_mask.asc")?;
//! mask.build_subset(None)?;
//! let mask = Arc::new(mask);
//!
//! let options = RasterOptions::new().with_mask(Arc::clone(&mask));
//! let dem: Raster<f32> = Raster::open("dem.tif", &options)?;
//! dem.output_subsets_to_file("out/dem.tif")?;
//! ```
//!
//! Batch runs over many inputs go through [`pipeline::run_mask_job`].

pub mod cell;
pub mod config;
pub mod error;
pub mod header;
pub mod io;
pub mod logging;
pub mod mask;
pub mod pipeline;
pub mod raster;
pub mod subset;

pub use cell::{CellValue, DataType, NODATA_VALUE};
pub use config::{ConfigError, MaskInput, MaskJob, SubsetMode};
pub use error::{RasterError, RasterResult};
pub use header::RasterHeader;
pub use mask::MaskRaster;
pub use raster::{Raster, RasterOptions, RasterStats};
pub use subset::{SubsetBounds, SubsetPositions};

/// Version of the GridMask library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
