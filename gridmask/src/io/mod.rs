//! Storage backends.
//!
//! File backends are selected by extension through [`RasterFormat`]:
//!
//! | Extension       | Backend            |
//! |-----------------|--------------------|
//! | `.asc`          | [`AsciiGridBackend`] |
//! | `.tif`, `.tiff` | [`GeoTiffBackend`]   |
//!
//! Every backend exchanges values as `f64` through [`GridData`]; the
//! raster layer converts to its own cell type. Named blobs live behind the
//! [`BlobStore`] trait.

mod ascii;
pub mod blob;
mod geotiff;
pub mod naming;

pub use ascii::AsciiGridBackend;
pub use blob::{BlobPayload, BlobStore, DirectoryBlobStore, MemoryBlobStore, RasterBlob, SubsetBlob};
pub use geotiff::GeoTiffBackend;

use crate::cell::{CellValue, DataType};
use crate::error::{RasterError, RasterResult};
use crate::header::RasterHeader;
use std::borrow::Cow;
use std::fs;
use std::path::Path;

/// Header plus per-layer, row-major values as read from a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GridData {
    pub header: RasterHeader,
    /// Element type declared by the source.
    pub data_type: DataType,
    pub layers: Vec<Vec<f64>>,
}

/// A file format that can read and write whole rasters.
///
/// Implementations must be thread-safe; masking jobs read and write
/// several files concurrently.
pub trait RasterBackend: Send + Sync {
    /// Short format name used in log output.
    fn name(&self) -> &'static str;

    /// Read only the header.
    fn read_header(&self, path: &Path) -> RasterResult<RasterHeader>;

    /// Read the header and every layer.
    fn read_full(&self, path: &Path) -> RasterResult<GridData>;

    /// Write all layers, converting values to `out_type`.
    fn write_full(
        &self,
        path: &Path,
        header: &RasterHeader,
        layers: &[Vec<f64>],
        out_type: DataType,
    ) -> RasterResult<()>;
}

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    AsciiGrid,
    GeoTiff,
}

static ASCII_GRID: AsciiGridBackend = AsciiGridBackend;
static GEO_TIFF: GeoTiffBackend = GeoTiffBackend;

impl RasterFormat {
    /// Select a format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> RasterResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "asc" => Ok(RasterFormat::AsciiGrid),
            "tif" | "tiff" => Ok(RasterFormat::GeoTiff),
            _ => Err(RasterError::Format(format!(
                "unsupported raster extension for {}",
                path.display()
            ))),
        }
    }

    pub fn backend(&self) -> &'static dyn RasterBackend {
        match self {
            RasterFormat::AsciiGrid => &ASCII_GRID,
            RasterFormat::GeoTiff => &GEO_TIFF,
        }
    }
}

/// Move nodata to a value `out_type` can hold, in both the header and the
/// cells, so the declared nodata matches what is actually written.
pub(crate) fn fit_nodata<'a>(
    header: &RasterHeader,
    layers: &'a [Vec<f64>],
    out_type: DataType,
) -> (RasterHeader, Cow<'a, [Vec<f64>]>) {
    let nodata = header.nodata();
    let target = out_type.nodata_for(nodata);
    if target.same_as(nodata) {
        return (header.clone(), Cow::Borrowed(layers));
    }
    let remapped = layers
        .iter()
        .map(|layer| {
            layer
                .iter()
                .map(|v| if v.same_as(nodata) { target } else { *v })
                .collect()
        })
        .collect();
    (header.clone().with_nodata(target), Cow::Owned(remapped))
}

/// Read a whole raster, selecting the backend by extension.
pub fn read_grid(path: &Path) -> RasterResult<GridData> {
    let backend = RasterFormat::from_path(path)?.backend();
    if !path.exists() {
        return Err(RasterError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "raster file not found"),
        ));
    }
    let grid = backend.read_full(path)?;
    tracing::debug!(
        path = %path.display(),
        backend = backend.name(),
        rows = grid.header.rows(),
        cols = grid.header.cols(),
        layers = grid.layers.len(),
        "Read raster"
    );
    Ok(grid)
}

/// Read only a raster header, selecting the backend by extension.
pub fn read_header(path: &Path) -> RasterResult<RasterHeader> {
    RasterFormat::from_path(path)?.backend().read_header(path)
}

/// Write a whole raster, creating the parent directory if needed.
pub fn write_grid(
    path: &Path,
    header: &RasterHeader,
    layers: &[Vec<f64>],
    out_type: DataType,
) -> RasterResult<()> {
    let backend = RasterFormat::from_path(path)?.backend();
    let expected = header.cell_count();
    if let Some(bad) = layers.iter().find(|layer| layer.len() != expected) {
        return Err(RasterError::SizeMismatch {
            expected,
            actual: bad.len(),
        });
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| RasterError::io(parent, e))?;
    }
    backend.write_full(path, header, layers, out_type)?;
    tracing::debug!(
        path = %path.display(),
        backend = backend.name(),
        out_type = %out_type,
        "Wrote raster"
    );
    Ok(())
}
