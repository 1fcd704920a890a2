//! Writing subsets as tiles or blobs, and merging them back.

use super::SubsetPositions;
use crate::cell::DataType;
use crate::error::{RasterError, RasterResult};
use crate::header::RasterHeader;
use crate::io::{self, naming, BlobStore};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Count successes, log every failure and return the first one.
fn settle(outcomes: Vec<(i32, RasterResult<()>)>, what: &str) -> RasterResult<usize> {
    let mut written = 0;
    let mut first_error = None;
    for (group, outcome) in outcomes {
        match outcome {
            Ok(()) => written += 1,
            Err(e) => {
                warn!(group, error = %e, "Failed to write subset {}", what);
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(written),
    }
}

/// Write one tile per group as `<dir>/<core>_<group>.<ext>`, where
/// directory, core name and extension come from `template`.
pub(crate) fn write_subset_tiles(
    subsets: &BTreeMap<i32, SubsetPositions>,
    grid: &RasterHeader,
    template: &Path,
    out_type: DataType,
) -> RasterResult<usize> {
    if subsets.is_empty() {
        return Err(RasterError::State("no subsets to write".into()));
    }
    let core = naming::core_name(template);
    let ext = template
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| {
            RasterError::Format(format!(
                "output path {} has no extension",
                template.display()
            ))
        })?;
    let dir = template.parent().unwrap_or_else(|| Path::new(""));

    let outcomes: Vec<(i32, RasterResult<()>)> = subsets
        .par_iter()
        .map(|(&group, subset)| {
            let path = dir.join(naming::subset_file_name(&core, group, ext));
            let header = subset.tile_header(grid);
            let layers = subset.tile_layers(grid.nodata());
            let outcome = io::write_grid(&path, &header, &layers, out_type);
            if outcome.is_ok() {
                debug!(group, path = %path.display(), cells = subset.cell_count(), "Wrote subset tile");
            }
            (group, outcome)
        })
        .collect();
    settle(outcomes, "tile")
}

/// Write one blob per group named by [`naming::subset_blob_name`].
pub(crate) fn write_subset_blobs(
    subsets: &BTreeMap<i32, SubsetPositions>,
    grid: &RasterHeader,
    store: &dyn BlobStore,
    core: &str,
    suffix: &str,
    full: bool,
) -> RasterResult<usize> {
    if subsets.is_empty() {
        return Err(RasterError::State("no subsets to write".into()));
    }
    let outcomes: Vec<(i32, RasterResult<()>)> = subsets
        .par_iter()
        .map(|(&group, subset)| {
            let name = naming::subset_blob_name(core, suffix, group, !full);
            (group, subset.write_blob(store, &name, grid, full))
        })
        .collect();
    settle(outcomes, "blob")
}

/// Scatter every group's values into full-grid, per-layer buffers.
///
/// Cells outside all groups hold the grid's nodata.
pub(crate) fn merge_subsets(
    subsets: &BTreeMap<i32, SubsetPositions>,
    grid: &RasterHeader,
) -> Vec<Vec<f64>> {
    let layers = subsets.values().map(|s| s.layers()).max().unwrap_or(1);
    let cells = grid.cell_count();
    let mut merged = vec![vec![grid.nodata(); cells]; layers];
    for subset in subsets.values() {
        let n = subset.layers();
        for (ordinal, cell) in subset.cells().iter().enumerate() {
            if cell.global_index >= cells {
                continue;
            }
            for layer in 0..n {
                merged[layer][cell.global_index] = subset.data()[ordinal * n + layer];
            }
        }
    }
    merged
}
