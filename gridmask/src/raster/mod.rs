//! Generic raster container.
//!
//! A [`Raster<T>`] is either *blank* (constructed without data) or
//! *loaded*, in which case it holds a header and exactly one [`Storage`]
//! layout. Accessors never fail: on a blank raster, or for an address
//! outside the grid, they return sentinels.
//!
//! | Accessor                    | Blank / out of range |
//! |-----------------------------|----------------------|
//! | `rows`, `cols`              | -9999                |
//! | `cell_width`, `xll`, `yll`  | -9999.0              |
//! | `layers`, `cell_count`, `data_length` | -1         |
//! | `get_value*`                | nodata               |
//! | `get_position`              | -2 (outside), -1 (not stored) |
//! | statistics                  | -9999.0              |
//! | `set_value*`                | `false`              |
//!
//! Operations that touch files, blobs or geometry return [`RasterResult`].

mod options;
mod stats;
mod storage;

pub use options::RasterOptions;
pub use stats::{compute_stats, RasterStats};
pub use storage::{CellPos, Storage};

use crate::cell::{CellValue, DataType, NODATA_VALUE};
use crate::error::{RasterError, RasterResult};
use crate::header::RasterHeader;
use crate::io::blob::{self, BlobPayload, BlobStore, RasterBlob};
use crate::io::{self, naming};
use crate::mask::engine::{self, MaskParams};
use crate::mask::{GridOffset, MaskRaster};
use crate::subset::{self, SubsetPositions};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

const BLANK_DIMENSION: i64 = -9999;
const BLANK_COUNT: i64 = -1;
const POSITION_OUTSIDE: i64 = -2;
const POSITION_NOT_STORED: i64 = -1;

#[derive(Debug, Clone)]
struct MaskLink {
    mask: Arc<MaskRaster>,
    /// From mask cells to this raster's cells.
    offset: GridOffset,
}

/// A georeferenced grid of `T` values with one or more layers.
#[derive(Debug, Clone)]
pub struct Raster<T: CellValue> {
    header: Option<RasterHeader>,
    storage: Option<Storage<T>>,
    nodata: T,
    default_value: T,
    file_path: PathBuf,
    core_name: String,
    out_type: Option<DataType>,
    mask: Option<MaskLink>,
    use_mask_extent: bool,
    subsets: BTreeMap<i32, SubsetPositions>,
    stats: OnceLock<Vec<RasterStats>>,
}

impl<T: CellValue> Default for Raster<T> {
    fn default() -> Self {
        Self::blank()
    }
}

impl<T: CellValue> Raster<T> {
    /// A raster without data. Every accessor returns its sentinel.
    pub fn blank() -> Self {
        Self {
            header: None,
            storage: None,
            nodata: T::from_f64(T::DATA_TYPE.nodata_for(NODATA_VALUE)),
            default_value: T::from_f64(T::DATA_TYPE.nodata_for(NODATA_VALUE)),
            file_path: PathBuf::new(),
            core_name: String::new(),
            out_type: None,
            mask: None,
            use_mask_extent: false,
            subsets: BTreeMap::new(),
            stats: OnceLock::new(),
        }
    }

    /// Build from in-memory, per-layer, row-major buffers.
    ///
    /// When `T` cannot hold the header's nodata the header switches to
    /// [`DataType::nodata_for`], and nodata cells must already use that value.
    pub fn new(
        header: RasterHeader,
        layers: Vec<Vec<T>>,
        options: &RasterOptions,
    ) -> RasterResult<Self> {
        Self::assemble(header, layers, None, options)
    }

    /// Read a raster file, selecting the backend by extension.
    pub fn open(path: impl AsRef<Path>, options: &RasterOptions) -> RasterResult<Self> {
        let path = path.as_ref();
        let grid = io::read_grid(path)?;
        let nodata = grid.header.nodata();
        let layers = convert_layers(grid.layers, nodata, T::DATA_TYPE.nodata_for(nodata));
        Self::assemble(grid.header, layers, Some(path), options)
    }

    /// Read several single-grid files as the layers of one raster.
    ///
    /// # Errors
    ///
    /// `RasterError::Geometry` if the files do not share a grid.
    pub fn open_many<P: AsRef<Path>>(paths: &[P], options: &RasterOptions) -> RasterResult<Self> {
        let Some(first) = paths.first() else {
            return Err(RasterError::State("no raster files given".into()));
        };
        let first = first.as_ref();
        let mut header: Option<RasterHeader> = None;
        let mut layers = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let grid = io::read_grid(path)?;
            let shared = header.get_or_insert_with(|| grid.header.clone());
            if !shared.same_grid(&grid.header) {
                return Err(RasterError::Geometry(format!(
                    "{} does not share the grid of {}",
                    path.display(),
                    first.display()
                )));
            }
            // Each file's own nodata maps onto the first file's.
            let target = T::DATA_TYPE.nodata_for(shared.nodata());
            layers.extend(convert_layers(grid.layers, grid.header.nodata(), target));
        }
        let Some(header) = header else {
            return Err(RasterError::State("no raster files given".into()));
        };
        Self::assemble(header, layers, Some(first), options)
    }

    /// Load a raster written by [`output_to_blob`](Self::output_to_blob).
    pub fn from_blob(
        store: &dyn BlobStore,
        name: &str,
        options: &RasterOptions,
    ) -> RasterResult<Self> {
        let blob: RasterBlob = blob::decode(name, &store.read_blob(name)?)?;
        let nodata = blob.header.nodata();
        let layers = convert_layers(
            blob.payload.into_dense(&blob.header)?,
            nodata,
            T::DATA_TYPE.nodata_for(nodata),
        );
        let mut raster = Self::assemble(blob.header, layers, None, options)?;
        raster.core_name = name.to_string();
        Ok(raster)
    }

    fn assemble(
        header: RasterHeader,
        layers: Vec<Vec<T>>,
        source: Option<&Path>,
        options: &RasterOptions,
    ) -> RasterResult<Self> {
        if layers.is_empty() {
            return Err(RasterError::State("raster has no layers".into()));
        }
        let expected = header.cell_count();
        if let Some(bad) = layers.iter().find(|l| l.len() != expected) {
            return Err(RasterError::SizeMismatch {
                expected,
                actual: bad.len(),
            });
        }
        let source_nodata = header.nodata();
        let nodata = T::DATA_TYPE.nodata_for(source_nodata);
        let header = header.with_layers(layers.len()).with_nodata(nodata);

        let mut raster = Self::blank();
        raster.nodata = T::from_f64(nodata);
        raster.default_value = if options.default_value.same_as(source_nodata) {
            raster.nodata
        } else {
            T::from_f64(options.default_value)
        };
        raster.out_type = options.out_type;
        if let Some(path) = source {
            raster.file_path = path.to_path_buf();
            raster.core_name = naming::core_name(path);
        }

        match &options.mask {
            Some(mask) => {
                let params = MaskParams {
                    calc_positions: options.calc_positions,
                    use_mask_extent: options.use_mask_extent,
                    default_value: raster.default_value,
                };
                let masked = engine::apply_mask(&header, &layers, mask, &params)?;
                raster.header = Some(masked.header);
                raster.storage = Some(masked.storage);
                raster.mask = Some(MaskLink {
                    mask: Arc::clone(mask),
                    offset: masked.offset,
                });
                raster.use_mask_extent = options.use_mask_extent;
                raster.subsets = raster.gather_subsets();
            }
            None => {
                raster.header = Some(header);
                raster.storage = Some(Storage::from_layers(layers));
                if options.calc_positions {
                    raster.calculate_positions();
                }
            }
        }

        debug!(
            core = %raster.core_name,
            rows = raster.rows(),
            cols = raster.cols(),
            layers = raster.layers(),
            masked = raster.mask.is_some(),
            sparse = raster.positions_calculated(),
            "Loaded raster"
        );
        Ok(raster)
    }

    // ------------------------------------------------------------------
    // Header accessors
    // ------------------------------------------------------------------

    pub fn is_blank(&self) -> bool {
        self.header.is_none() || self.storage.is_none()
    }

    /// Whether the header and storage agree.
    pub fn validate(&self) -> bool {
        match (&self.header, &self.storage) {
            (Some(header), Some(storage)) => {
                storage.layers() == header.layers()
                    && if storage.is_sparse() {
                        storage.data_length() <= header.cell_count()
                    } else {
                        storage.data_length() == header.cell_count()
                    }
            }
            _ => false,
        }
    }

    pub fn header(&self) -> Option<&RasterHeader> {
        self.header.as_ref()
    }

    pub fn rows(&self) -> i64 {
        self.header
            .as_ref()
            .map_or(BLANK_DIMENSION, |h| h.rows() as i64)
    }

    pub fn cols(&self) -> i64 {
        self.header
            .as_ref()
            .map_or(BLANK_DIMENSION, |h| h.cols() as i64)
    }

    pub fn cell_width(&self) -> f64 {
        self.header
            .as_ref()
            .map_or(NODATA_VALUE, RasterHeader::cell_width)
    }

    pub fn xll_center(&self) -> f64 {
        self.header
            .as_ref()
            .map_or(NODATA_VALUE, RasterHeader::xll_center)
    }

    pub fn yll_center(&self) -> f64 {
        self.header
            .as_ref()
            .map_or(NODATA_VALUE, RasterHeader::yll_center)
    }

    pub fn layers(&self) -> i64 {
        self.storage
            .as_ref()
            .map_or(BLANK_COUNT, |s| s.layers() as i64)
    }

    /// Cells in the full grid (`rows * cols`).
    pub fn cell_count(&self) -> i64 {
        self.header
            .as_ref()
            .map_or(BLANK_COUNT, |h| h.cell_count() as i64)
    }

    /// Stored cells: equals `cell_count` for dense storage, the number of
    /// selected cells for sparse storage.
    pub fn data_length(&self) -> i64 {
        self.storage
            .as_ref()
            .map_or(BLANK_COUNT, |s| s.data_length() as i64)
    }

    pub fn nodata(&self) -> T {
        self.nodata
    }

    pub fn default_value(&self) -> T {
        self.default_value
    }

    pub fn srs(&self) -> &str {
        self.header.as_ref().map_or("", RasterHeader::srs)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn core_name(&self) -> &str {
        &self.core_name
    }

    pub fn set_core_name(&mut self, name: impl Into<String>) {
        self.core_name = name.into();
    }

    pub fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }

    /// Element type used when writing.
    pub fn out_type(&self) -> DataType {
        self.out_type.unwrap_or(T::DATA_TYPE)
    }

    pub fn set_out_type(&mut self, out_type: Option<DataType>) {
        self.out_type = out_type;
    }

    pub fn is_2d(&self) -> bool {
        self.layers() > 1
    }

    pub fn positions_calculated(&self) -> bool {
        self.storage.as_ref().is_some_and(Storage::is_sparse)
    }

    pub fn use_mask_extent(&self) -> bool {
        self.use_mask_extent
    }

    pub fn mask(&self) -> Option<&Arc<MaskRaster>> {
        self.mask.as_ref().map(|link| &link.mask)
    }

    pub fn subsets(&self) -> &BTreeMap<i32, SubsetPositions> {
        &self.subsets
    }

    // ------------------------------------------------------------------
    // Data access
    // ------------------------------------------------------------------

    /// Values of a single-layer raster in storage order.
    pub fn raster_data(&self) -> Option<&[T]> {
        match self.storage.as_ref()? {
            Storage::Dense1D(values) => Some(values.as_slice()),
            Storage::Sparse {
                values, layers: 1, ..
            } => Some(values.as_slice()),
            _ => None,
        }
    }

    /// Cell-major values and layer count of a multi-layer raster.
    pub fn raster_2d_data(&self) -> Option<(&[T], usize)> {
        match self.storage.as_ref()? {
            Storage::Dense2D { values, layers } => Some((values.as_slice(), *layers)),
            Storage::Sparse { values, layers, .. } if *layers > 1 => {
                Some((values.as_slice(), *layers))
            }
            _ => None,
        }
    }

    /// Cell positions of sparse storage.
    pub fn position_data(&self) -> Option<&[CellPos]> {
        self.storage.as_ref()?.positions()
    }

    fn slot(&self, row: i64, col: i64) -> Option<usize> {
        let header = self.header.as_ref()?;
        let storage = self.storage.as_ref()?;
        let row = usize::try_from(row).ok().filter(|r| *r < header.rows())?;
        let col = usize::try_from(col).ok().filter(|c| *c < header.cols())?;
        storage.slot_of(CellPos::new(row, col), header.cols())
    }

    fn stored(&self, slot: Option<usize>, layer: i64) -> T {
        let layer = usize::try_from(layer).ok();
        match (self.storage.as_ref(), slot, layer) {
            (Some(storage), Some(slot), Some(layer)) => {
                storage.value(slot, layer).unwrap_or(self.nodata)
            }
            _ => self.nodata,
        }
    }

    pub fn get_value(&self, row: i64, col: i64) -> T {
        self.get_value_in_layer(row, col, 0)
    }

    pub fn get_value_in_layer(&self, row: i64, col: i64, layer: i64) -> T {
        self.stored(self.slot(row, col), layer)
    }

    /// Every layer's value at `(row, col)`, or `None` when not stored.
    pub fn get_values(&self, row: i64, col: i64) -> Option<Vec<T>> {
        let slot = self.slot(row, col)?;
        self.values_at_slot(slot)
    }

    /// Value at a storage index: a cell index for dense storage, an
    /// ordinal for sparse storage.
    pub fn get_value_by_index(&self, index: i64) -> T {
        self.get_value_by_index_in_layer(index, 0)
    }

    pub fn get_value_by_index_in_layer(&self, index: i64, layer: i64) -> T {
        self.stored(usize::try_from(index).ok(), layer)
    }

    pub fn get_values_by_index(&self, index: i64) -> Option<Vec<T>> {
        self.values_at_slot(usize::try_from(index).ok()?)
    }

    fn values_at_slot(&self, slot: usize) -> Option<Vec<T>> {
        let storage = self.storage.as_ref()?;
        (0..storage.layers())
            .map(|layer| storage.value(slot, layer))
            .collect()
    }

    /// Storage index of the cell containing `(x, y)`.
    ///
    /// Returns -2 when the point is outside the grid (or the raster is
    /// blank) and -1 when sparse storage does not hold that cell.
    pub fn get_position(&self, x: f64, y: f64) -> i64 {
        let (Some(header), Some(storage)) = (self.header.as_ref(), self.storage.as_ref()) else {
            return POSITION_OUTSIDE;
        };
        let Some((row, col)) = header.cell_of(x, y) else {
            return POSITION_OUTSIDE;
        };
        storage
            .slot_of(CellPos::new(row, col), header.cols())
            .map_or(POSITION_NOT_STORED, |slot| slot as i64)
    }

    /// Overwrite the first layer's value at `(row, col)`.
    ///
    /// Returns `false` (and changes nothing) for a blank raster or a cell
    /// that is not stored.
    pub fn set_value(&mut self, row: i64, col: i64, value: T) -> bool {
        self.set_value_in_layer(row, col, 0, value)
    }

    pub fn set_value_in_layer(&mut self, row: i64, col: i64, layer: i64, value: T) -> bool {
        let (Some(slot), Ok(layer)) = (self.slot(row, col), usize::try_from(layer)) else {
            return false;
        };
        let changed = self
            .storage
            .as_mut()
            .is_some_and(|s| s.set(slot, layer, value));
        if changed {
            self.stats.take();
        }
        changed
    }

    /// Switch to sparse storage holding only the selected cells.
    ///
    /// Selected cells are the mask-valid cells for a masked raster,
    /// otherwise the cells holding a value other than nodata in any layer.
    /// Returns `false` for a blank raster; idempotent otherwise.
    pub fn calculate_positions(&mut self) -> bool {
        let (Some(header), Some(storage)) = (self.header.as_ref(), self.storage.as_ref()) else {
            return false;
        };
        if storage.is_sparse() {
            return true;
        }

        let (rows, cols) = (header.rows(), header.cols());
        let layers = storage.layers();
        let positions: Vec<CellPos> = match &self.mask {
            Some(link) => link
                .mask
                .positions()
                .iter()
                .filter_map(|p| link.offset.apply(*p, rows, cols))
                .collect(),
            None => (0..header.cell_count())
                .filter(|&i| {
                    (0..layers).any(|l| {
                        storage
                            .value(i, l)
                            .is_some_and(|v| !v.same_as(self.nodata))
                    })
                })
                .map(|i| CellPos::from_index(i, cols))
                .collect(),
        };

        let mut values = Vec::with_capacity(positions.len() * layers);
        for pos in &positions {
            let index = pos.index(cols);
            for layer in 0..layers {
                values.push(storage.value(index, layer).unwrap_or(self.nodata));
            }
        }

        debug!(
            core = %self.core_name,
            stored = positions.len(),
            cells = header.cell_count(),
            "Calculated positions"
        );
        self.storage = Some(Storage::Sparse {
            values,
            layers,
            positions,
        });
        self.stats.take();
        true
    }

    /// Cells holding a value other than nodata in the first layer.
    pub(crate) fn valid_positions(&self) -> Vec<CellPos> {
        let (Some(header), Some(storage)) = (self.header.as_ref(), self.storage.as_ref()) else {
            return Vec::new();
        };
        match storage {
            Storage::Sparse {
                positions, values, layers, ..
            } => positions
                .iter()
                .enumerate()
                .filter(|(ordinal, _)| !values[ordinal * layers].same_as(self.nodata))
                .map(|(_, pos)| *pos)
                .collect(),
            _ => storage
                .layer_iter(0)
                .enumerate()
                .filter(|(_, v)| !v.same_as(self.nodata))
                .map(|(i, _)| CellPos::from_index(i, header.cols()))
                .collect(),
        }
    }

    /// Expand the raster to the mask's full grid.
    ///
    /// Only meaningful for a raster masked with a tight extent. Mask-valid
    /// cells that were outside the previous extent take the default value.
    /// Returns `false` when there is no mask or the raster is blank.
    pub fn set_use_mask_extent(&mut self) -> bool {
        let Some(link) = self.mask.clone() else {
            return false;
        };
        let Some(header) = self.header.clone() else {
            return false;
        };
        if self.use_mask_extent {
            return true;
        }
        let Some(storage) = self.storage.take() else {
            return false;
        };

        let was_sparse = storage.is_sparse();
        let layers = storage.layers();
        let old = storage.to_dense_layers(header.cell_count(), header.cols(), self.nodata);
        let mask_header = link.mask.header();
        let new_header = header.with_extent(
            mask_header.rows(),
            mask_header.cols(),
            mask_header.xll_center(),
            mask_header.yll_center(),
        );

        let positions = link.mask.positions();
        let mut values = Vec::with_capacity(positions.len() * layers);
        for pos in positions {
            let source = link.offset.apply(*pos, header.rows(), header.cols());
            for layer in old.iter() {
                values.push(match source {
                    Some(p) => layer[p.index(header.cols())],
                    None => self.default_value,
                });
            }
        }

        let storage = if was_sparse {
            Storage::Sparse {
                values,
                layers,
                positions: positions.to_vec(),
            }
        } else {
            let mut dense = vec![vec![self.nodata; new_header.cell_count()]; layers];
            for (ordinal, pos) in positions.iter().enumerate() {
                let index = pos.index(new_header.cols());
                for (layer, buf) in dense.iter_mut().enumerate() {
                    buf[index] = values[ordinal * layers + layer];
                }
            }
            Storage::from_layers(dense)
        };

        self.header = Some(new_header);
        self.storage = Some(storage);
        self.mask = Some(MaskLink {
            mask: link.mask,
            offset: GridOffset::default(),
        });
        self.use_mask_extent = true;
        self.stats.take();
        true
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    fn all_statistics(&self) -> Option<&[RasterStats]> {
        let storage = self.storage.as_ref()?;
        let stats = self.stats.get_or_init(|| {
            (0..storage.layers())
                .map(|layer| compute_stats(storage.layer_iter(layer), self.nodata))
                .collect()
        });
        Some(stats.as_slice())
    }

    /// Statistics of one layer, computed on first request and cached
    /// until the data changes.
    pub fn statistics(&self, layer: usize) -> Option<RasterStats> {
        self.all_statistics()?.get(layer).copied()
    }

    pub fn statistics_calculated(&self) -> bool {
        self.stats.get().is_some()
    }

    fn first_layer_stat(&self, pick: impl Fn(&RasterStats) -> f64) -> f64 {
        self.statistics(0).map_or(NODATA_VALUE, |s| pick(&s))
    }

    pub fn valid_count(&self) -> i64 {
        self.statistics(0)
            .map_or(NODATA_VALUE as i64, |s| s.valid_count as i64)
    }

    pub fn minimum(&self) -> f64 {
        self.first_layer_stat(|s| s.min)
    }

    pub fn maximum(&self) -> f64 {
        self.first_layer_stat(|s| s.max)
    }

    pub fn average(&self) -> f64 {
        self.first_layer_stat(|s| s.mean)
    }

    pub fn std_dev(&self) -> f64 {
        self.first_layer_stat(|s| s.std_dev)
    }

    pub fn range(&self) -> f64 {
        self.first_layer_stat(RasterStats::range)
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    fn loaded(&self) -> RasterResult<(&RasterHeader, &Storage<T>)> {
        match (self.header.as_ref(), self.storage.as_ref()) {
            (Some(header), Some(storage)) => Ok((header, storage)),
            _ => Err(RasterError::State("raster is blank".into())),
        }
    }

    fn to_output_value(&self, value: T, nodata: f64) -> f64 {
        if value.same_as(self.nodata) {
            nodata
        } else {
            value.to_f64()
        }
    }

    /// Per-layer, row-major values over the full grid as `f64`.
    pub fn dense_layers(&self) -> Option<Vec<Vec<f64>>> {
        let (header, storage) = self.loaded().ok()?;
        Some(
            storage
                .to_dense_layers(header.cell_count(), header.cols(), self.nodata)
                .into_iter()
                .map(|layer| {
                    layer
                        .into_iter()
                        .map(|v| self.to_output_value(v, header.nodata()))
                        .collect()
                })
                .collect(),
        )
    }

    /// Write the full grid; the backend is chosen by extension.
    pub fn output_to_file(&self, path: impl AsRef<Path>) -> RasterResult<()> {
        let path = path.as_ref();
        let (header, _) = self.loaded()?;
        let layers = self.dense_layers().unwrap_or_default();
        io::write_grid(path, header, &layers, self.out_type())?;
        info!(path = %path.display(), out_type = %self.out_type(), "Wrote raster");
        Ok(())
    }

    /// Store the active representation under `name`: all cells for dense
    /// storage, only the selected cells for sparse storage.
    pub fn output_to_blob(&self, store: &dyn BlobStore, name: &str) -> RasterResult<()> {
        let (header, storage) = self.loaded()?;
        let payload = match storage {
            Storage::Sparse {
                values,
                layers,
                positions,
            } => BlobPayload::Valid {
                positions: positions.clone(),
                layers: *layers,
                values: values
                    .iter()
                    .map(|v| self.to_output_value(*v, header.nodata()))
                    .collect(),
            },
            _ => BlobPayload::Full {
                layers: self.dense_layers().unwrap_or_default(),
            },
        };
        let raster = RasterBlob {
            header: header.clone(),
            data_type: self.out_type(),
            payload,
        };
        store.write_blob(name, blob::encode(name, &raster)?)
    }

    // ------------------------------------------------------------------
    // Subsets
    // ------------------------------------------------------------------

    /// Mask grid carrying this raster's nodata and layer count; subset
    /// bounds are expressed in it.
    fn subset_grid(&self) -> RasterResult<RasterHeader> {
        let (header, _) = self.loaded()?;
        let link = self
            .mask
            .as_ref()
            .ok_or_else(|| RasterError::State("raster has no mask".into()))?;
        Ok(link
            .mask
            .header()
            .clone()
            .with_nodata(header.nodata())
            .with_layers(header.layers()))
    }

    /// Copy the mask's subsets, filled with this raster's values. Groups
    /// without a single non-nodata value are dropped.
    fn gather_subsets(&self) -> BTreeMap<i32, SubsetPositions> {
        let (Some(link), Some(header), Some(storage)) =
            (self.mask.as_ref(), self.header.as_ref(), self.storage.as_ref())
        else {
            return BTreeMap::new();
        };
        let mask_cols = link.mask.header().cols();
        let layers = storage.layers();
        let nodata = header.nodata();

        link.mask
            .subsets()
            .iter()
            .filter_map(|(&group, template)| {
                let mut data = Vec::with_capacity(template.cell_count() * layers);
                for index in template.global_indices() {
                    let mask_pos = CellPos::from_index(index, mask_cols);
                    let slot = link
                        .offset
                        .apply(mask_pos, header.rows(), header.cols())
                        .and_then(|p| storage.slot_of(p, header.cols()));
                    for layer in 0..layers {
                        let value = slot
                            .and_then(|s| storage.value(s, layer))
                            .map_or(nodata, |v| self.to_output_value(v, nodata));
                        data.push(value);
                    }
                }
                if data.iter().all(|v| *v == nodata) {
                    debug!(group, "Dropping subset without valid values");
                    return None;
                }
                let mut subset = template.clone();
                subset.assign(data, layers);
                Some((group, subset))
            })
            .collect()
    }

    /// Write one tile per subset as `<dir>/<core>_<group>.<ext>` taken
    /// from `template`.
    pub fn output_subsets_to_file(&self, template: impl AsRef<Path>) -> RasterResult<usize> {
        let grid = self.subset_grid()?;
        subset::write_subset_tiles(&self.subsets, &grid, template.as_ref(), self.out_type())
    }

    /// Write one blob per subset named `<core>_<suffix>[_valid]_<group>`.
    pub fn output_subsets_to_blob(
        &self,
        store: &dyn BlobStore,
        suffix: &str,
        full: bool,
    ) -> RasterResult<usize> {
        let grid = self.subset_grid()?;
        subset::write_subset_blobs(&self.subsets, &grid, store, &self.core_name, suffix, full)
    }
}

/// Convert backend values to `T`, moving `nodata` cells to `target`.
fn convert_layers<T: CellValue>(layers: Vec<Vec<f64>>, nodata: f64, target: f64) -> Vec<Vec<T>> {
    let target = T::from_f64(target);
    layers
        .into_iter()
        .map(|layer| {
            layer
                .into_iter()
                .map(|v| if v.same_as(nodata) { target } else { T::from_f64(v) })
                .collect()
        })
        .collect()
}
