//! Partitioning a mask into subsets, regrouping, and merging them back.

use super::MaskRaster;
use crate::cell::DataType;
use crate::error::{RasterError, RasterResult};
use crate::io::blob::{self, BlobPayload, BlobStore, RasterBlob};
use crate::io::{self as raster_io, naming};
use crate::subset::{self, SubsetPositions};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

impl MaskRaster {
    /// Partition the valid cells by mask value.
    ///
    /// Each raw value is translated through `group_map` when it has an
    /// entry; unmapped values are their own group id. Replaces any
    /// previously built subsets and returns the number of groups.
    pub fn build_subset(&mut self, group_map: Option<&HashMap<i32, i32>>) -> RasterResult<usize> {
        let cols = self.header.cols();
        let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for pos in self.positions() {
            let raw = self.group_of(*pos);
            let group = group_map
                .and_then(|m| m.get(&raw).copied())
                .unwrap_or(raw);
            groups.entry(group).or_default().push(pos.index(cols));
        }
        if groups.is_empty() {
            return Err(RasterError::State(format!(
                "mask {} has no valid cells",
                self.core_name()
            )));
        }

        self.subsets = groups
            .into_iter()
            .filter_map(|(group, cells)| {
                SubsetPositions::new(group, cells, cols).map(|s| (group, s))
            })
            .collect();
        info!(
            core = self.core_name(),
            groups = self.subsets.len(),
            "Built mask subsets"
        );
        Ok(self.subsets.len())
    }

    /// Merge existing subsets by mapping old group ids to new ones.
    ///
    /// Groups without an entry keep their id. Groups mapped to the same
    /// id are unioned and their bounds recomputed; assigned values are
    /// discarded.
    ///
    /// # Errors
    ///
    /// `RasterError::State` if no subsets exist or `group_map` names a
    /// group that does not exist.
    pub fn rebuild_subset(&mut self, group_map: &HashMap<i32, i32>) -> RasterResult<usize> {
        if self.subsets.is_empty() {
            return Err(RasterError::State(
                "rebuild requires subsets to be built first".into(),
            ));
        }
        let mut unknown: Vec<i32> = group_map
            .keys()
            .filter(|g| !self.subsets.contains_key(*g))
            .copied()
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(RasterError::State(format!(
                "unknown group ids in regroup map: {unknown:?}"
            )));
        }

        let cols = self.header.cols();
        let mut merged: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for (group, subset) in &self.subsets {
            let target = group_map.get(group).copied().unwrap_or(*group);
            merged.entry(target).or_default().extend(subset.global_indices());
        }

        let before = self.subsets.len();
        self.subsets = merged
            .into_iter()
            .filter_map(|(group, cells)| {
                SubsetPositions::new(group, cells, cols).map(|s| (group, s))
            })
            .collect();
        info!(
            core = self.core_name(),
            before,
            after = self.subsets.len(),
            "Regrouped mask subsets"
        );
        Ok(self.subsets.len())
    }

    /// Assign single-layer values to one group.
    pub fn set_subset_data(&mut self, group: i32, values: &[f64]) -> RasterResult<()> {
        self.subsets
            .get_mut(&group)
            .ok_or_else(|| RasterError::State(format!("no subset for group {group}")))?
            .set_data(values)
    }

    fn require_subsets(&self) -> RasterResult<()> {
        if self.subsets.is_empty() {
            return Err(RasterError::State(format!(
                "mask {} has no subsets",
                self.core_name()
            )));
        }
        Ok(())
    }

    /// Scatter all subsets' values into full-grid, per-layer buffers.
    pub fn merged_layers(&self) -> RasterResult<Vec<Vec<f64>>> {
        self.require_subsets()?;
        Ok(subset::merge_subsets(&self.subsets, &self.header))
    }

    /// Write one tile per group as `<dir>/<core>_<group>.<ext>` taken from
    /// `template`. Returns the number of tiles written.
    pub fn output_subsets_to_file(
        &self,
        template: impl AsRef<Path>,
        out_type: DataType,
    ) -> RasterResult<usize> {
        self.require_subsets()?;
        subset::write_subset_tiles(&self.subsets, &self.header, template.as_ref(), out_type)
    }

    /// Write one blob per group named `<core>_<suffix>[_valid]_<group>`.
    pub fn output_subsets_to_blob(
        &self,
        store: &dyn BlobStore,
        suffix: &str,
        full: bool,
    ) -> RasterResult<usize> {
        self.require_subsets()?;
        subset::write_subset_blobs(
            &self.subsets,
            &self.header,
            store,
            self.core_name(),
            suffix,
            full,
        )
    }

    /// Load every group's values from blobs written by
    /// [`output_subsets_to_blob`](Self::output_subsets_to_blob).
    pub fn read_subsets_from_blob(
        &mut self,
        store: &dyn BlobStore,
        suffix: &str,
        full: bool,
    ) -> RasterResult<usize> {
        self.require_subsets()?;
        let core = self.core_name().to_string();
        for (group, subset) in self.subsets.iter_mut() {
            let name = naming::subset_blob_name(&core, suffix, *group, !full);
            subset.read_blob(store, &name)?;
            debug!(group, blob = %name, "Loaded subset from blob");
        }
        Ok(self.subsets.len())
    }

    /// Write the merged subsets as one raster on the mask's grid.
    pub fn output_merged_to_file(
        &self,
        path: impl AsRef<Path>,
        out_type: DataType,
    ) -> RasterResult<()> {
        let path = path.as_ref();
        let layers = self.merged_layers()?;
        let header = self.header.clone().with_layers(layers.len());
        raster_io::write_grid(path, &header, &layers, out_type)?;
        info!(path = %path.display(), groups = self.subsets.len(), "Wrote merged subsets");
        Ok(())
    }

    /// Store the merged subsets as a full raster blob.
    pub fn output_merged_to_blob(&self, store: &dyn BlobStore, name: &str) -> RasterResult<()> {
        let layers = self.merged_layers()?;
        let raster = RasterBlob {
            header: self.header.clone().with_layers(layers.len()),
            data_type: DataType::Float64,
            payload: BlobPayload::Full { layers },
        };
        store.write_blob(name, blob::encode(name, &raster)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::NODATA_VALUE;
    use crate::header::RasterHeader;
    use crate::io::MemoryBlobStore;
    use crate::raster::{Raster, RasterOptions};

    const ND: i32 = -9999;

    // 4 x 7 mask, last row and final cell of row 2 are nodata.
    fn mask() -> MaskRaster {
        let header = RasterHeader::new(4, 7, 2.0, 1.0, 1.0, NODATA_VALUE).unwrap();
        #[rustfmt::skip]
        let values = vec![
            1, 3, 1, 1, 2, 2, 3,
            1, 1, 1, 2, 3, 4, 4,
            1, 2, 3, 3, 3, 4, ND,
            ND, ND, ND, ND, ND, ND, ND,
        ];
        let raster = Raster::new(header, vec![values], &RasterOptions::default()).unwrap();
        MaskRaster::from_raster(raster).unwrap()
    }

    fn indices(mask: &MaskRaster, group: i32) -> Vec<usize> {
        mask.subset(group).unwrap().global_indices().collect()
    }

    #[test]
    fn test_build_subset_groups() {
        let mut mask = mask();
        assert_eq!(mask.build_subset(None).unwrap(), 4);
        assert_eq!(indices(&mask, 1), vec![0, 2, 3, 7, 8, 9, 14]);
        assert_eq!(indices(&mask, 2), vec![4, 5, 10, 15]);
        assert_eq!(indices(&mask, 3), vec![1, 6, 11, 16, 17, 18]);
        assert_eq!(indices(&mask, 4), vec![12, 13, 19]);
    }

    #[test]
    fn test_build_subset_with_group_map() {
        let mut mask = mask();
        let map = HashMap::from([(4, 1), (3, 30)]);
        assert_eq!(mask.build_subset(Some(&map)).unwrap(), 3);
        assert_eq!(mask.subset(1).unwrap().cell_count(), 10);
        assert_eq!(mask.subset(30).unwrap().cell_count(), 6);
        assert!(mask.subset(3).is_none());
    }

    #[test]
    fn test_rebuild_merges_groups() {
        let mut mask = mask();
        mask.build_subset(None).unwrap();
        let map = HashMap::from([(1, 1), (2, 2), (3, 3), (4, 1)]);
        assert_eq!(mask.rebuild_subset(&map).unwrap(), 3);

        let merged = mask.subset(1).unwrap();
        assert_eq!(
            merged.global_indices().collect::<Vec<_>>(),
            vec![0, 2, 3, 7, 8, 9, 12, 13, 14, 19]
        );
        let b = merged.bounds();
        assert_eq!((b.start_row, b.end_row, b.start_col, b.end_col), (0, 2, 0, 6));
    }

    #[test]
    fn test_rebuild_identity_is_noop() {
        let mut mask = mask();
        mask.build_subset(None).unwrap();
        let before = mask.subsets().clone();
        let map = HashMap::from([(1, 1), (2, 2), (3, 3), (4, 4)]);
        mask.rebuild_subset(&map).unwrap();
        assert_eq!(mask.subsets(), &before);
    }

    #[test]
    fn test_rebuild_rejects_unknown_group() {
        let mut mask = mask();
        mask.build_subset(None).unwrap();
        let map = HashMap::from([(9, 1)]);
        assert!(matches!(
            mask.rebuild_subset(&map),
            Err(RasterError::State(_))
        ));
    }

    #[test]
    fn test_rebuild_without_subsets() {
        let mut mask = mask();
        assert!(mask.rebuild_subset(&HashMap::new()).is_err());
    }

    #[test]
    fn test_set_subset_data_unknown_group() {
        let mut mask = mask();
        mask.build_subset(None).unwrap();
        assert!(mask.set_subset_data(8, &[1.0]).is_err());
        assert!(mask.set_subset_data(4, &[1.0, 2.0, 3.0]).is_ok());
    }

    #[test]
    fn test_merged_blob_round_trip() {
        let mut mask = mask();
        mask.build_subset(None).unwrap();
        mask.set_subset_data(4, &[7.0, 8.0, 9.0]).unwrap();

        let store = MemoryBlobStore::new();
        mask.output_merged_to_blob(&store, "merged").unwrap();
        let merged: Raster<f64> =
            Raster::from_blob(&store, "merged", &RasterOptions::default()).unwrap();
        assert_eq!(merged.get_value(1, 5), 7.0);
        assert_eq!(merged.get_value(2, 5), 9.0);
        assert_eq!(merged.get_value(0, 0), NODATA_VALUE);
    }

    #[test]
    fn test_subset_blobs_round_trip() {
        let mut mask = mask();
        mask.build_subset(None).unwrap();
        mask.set_subset_data(2, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        let store = MemoryBlobStore::new();
        mask.output_subsets_to_blob(&store, "ASC", false).unwrap();

        let mut reloaded = self::mask();
        reloaded.build_subset(None).unwrap();
        reloaded.read_subsets_from_blob(&store, "ASC", false).unwrap();
        assert_eq!(reloaded.subset(2).unwrap().data(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
