//! Property tests for partitioning and merging.

use gridmask::{MaskRaster, Raster, RasterError, RasterHeader, RasterOptions, NODATA_VALUE};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

const ND: i32 = -9999;

/// Random mask grids: dimensions 1..8, values 1..4 or nodata.
fn mask_grid() -> impl Strategy<Value = (usize, usize, Vec<i32>)> {
    (1usize..8, 1usize..8).prop_flat_map(|(rows, cols)| {
        let cell = prop_oneof![Just(ND), 1i32..5];
        proptest::collection::vec(cell, rows * cols).prop_map(move |v| (rows, cols, v))
    })
}

fn mask_from(rows: usize, cols: usize, values: Vec<i32>) -> MaskRaster {
    let header = RasterHeader::new(rows, cols, 1.0, 0.0, 0.0, NODATA_VALUE).unwrap();
    let raster = Raster::new(header, vec![values], &RasterOptions::default()).unwrap();
    MaskRaster::from_raster(raster).unwrap()
}

const FILL: f64 = -1.0;

/// An input grid at the origin and a mask shifted by whole cells.
#[derive(Debug, Clone)]
struct Scene {
    input_rows: usize,
    input_cols: usize,
    input_valid: Vec<bool>,
    mask_rows: usize,
    mask_cols: usize,
    mask_valid: Vec<bool>,
    dx: i64,
    dy: i64,
}

impl Scene {
    fn input(&self, options: &RasterOptions) -> Result<Raster<f64>, RasterError> {
        let header =
            RasterHeader::new(self.input_rows, self.input_cols, 1.0, 0.0, 0.0, NODATA_VALUE)?;
        let values = (0..self.input_valid.len())
            .map(|i| if self.input_valid[i] { i as f64 } else { NODATA_VALUE })
            .collect();
        Raster::new(header, vec![values], options)
    }

    fn mask(&self) -> Arc<MaskRaster> {
        let header = RasterHeader::new(
            self.mask_rows,
            self.mask_cols,
            1.0,
            self.dx as f64,
            self.dy as f64,
            NODATA_VALUE,
        )
        .unwrap();
        let values = self.mask_valid.iter().map(|v| if *v { 1 } else { ND }).collect();
        let raster = Raster::new(header, vec![values], &RasterOptions::default()).unwrap();
        Arc::new(MaskRaster::from_raster(raster).unwrap())
    }

    /// Input cell under mask cell `(r, c)`, if the input covers it.
    fn input_cell(&self, r: usize, c: usize) -> Option<usize> {
        let row = r as i64 + self.input_rows as i64 - self.dy - self.mask_rows as i64;
        let col = c as i64 + self.dx;
        if row < 0 || col < 0 || row >= self.input_rows as i64 || col >= self.input_cols as i64 {
            return None;
        }
        Some(row as usize * self.input_cols + col as usize)
    }

    /// Value a masked read should produce at mask cell `(r, c)`.
    fn expected(&self, r: usize, c: usize) -> f64 {
        if !self.mask_valid[r * self.mask_cols + c] {
            return NODATA_VALUE;
        }
        match self.input_cell(r, c) {
            Some(i) if self.input_valid[i] => i as f64,
            _ => FILL,
        }
    }

    fn overlaps(&self) -> bool {
        (0..self.mask_rows).any(|r| {
            (0..self.mask_cols)
                .any(|c| self.mask_valid[r * self.mask_cols + c] && self.input_cell(r, c).is_some())
        })
    }

    /// Center of mask cell `(r, c)`.
    fn center(&self, r: usize, c: usize) -> (f64, f64) {
        (
            (self.dx + c as i64) as f64,
            (self.dy + (self.mask_rows - 1 - r) as i64) as f64,
        )
    }
}

fn scene() -> impl Strategy<Value = Scene> {
    (1usize..6, 1usize..6, 1usize..6, 1usize..6, -5i64..6, -5i64..6).prop_flat_map(
        |(input_rows, input_cols, mask_rows, mask_cols, dx, dy)| {
            (
                proptest::collection::vec(any::<bool>(), input_rows * input_cols),
                proptest::collection::vec(any::<bool>(), mask_rows * mask_cols),
            )
                .prop_map(move |(input_valid, mask_valid)| Scene {
                    input_rows,
                    input_cols,
                    input_valid,
                    mask_rows,
                    mask_cols,
                    mask_valid,
                    dx,
                    dy,
                })
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        max_global_rejects: 65536,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_mask_extent_maps_every_mask_cell(scene in scene()) {
        prop_assume!(scene.overlaps());
        let options = RasterOptions::new()
            .with_mask(scene.mask())
            .with_default_value(FILL);
        let raster = scene.input(&options).unwrap();

        prop_assert_eq!(raster.rows(), scene.mask_rows as i64);
        prop_assert_eq!(raster.cols(), scene.mask_cols as i64);
        for r in 0..scene.mask_rows {
            for c in 0..scene.mask_cols {
                prop_assert_eq!(raster.get_value(r as i64, c as i64), scene.expected(r, c));
            }
        }
        let valid = scene.mask_valid.iter().filter(|v| **v).count();
        prop_assert_eq!(raster.valid_count(), valid as i64);
    }

    #[test]
    fn test_tight_extent_agrees_inside_intersection(scene in scene(), sparse in any::<bool>()) {
        prop_assume!(scene.overlaps());
        let mask = scene.mask();
        let full = scene
            .input(&RasterOptions::new().with_mask(Arc::clone(&mask)).with_default_value(FILL))
            .unwrap();
        let tight = scene
            .input(
                &RasterOptions::new()
                    .with_mask(mask)
                    .with_mask_extent(false)
                    .with_positions(sparse)
                    .with_default_value(FILL),
            )
            .unwrap();

        let mut inside = 0;
        for r in 0..scene.mask_rows {
            for c in 0..scene.mask_cols {
                if !scene.mask_valid[r * scene.mask_cols + c] || scene.input_cell(r, c).is_none() {
                    continue;
                }
                inside += 1;
                let (x, y) = scene.center(r, c);
                let position = tight.get_position(x, y);
                prop_assert!(position >= 0);
                prop_assert_eq!(tight.get_value_by_index(position), full.get_value(r as i64, c as i64));
            }
        }
        prop_assert_eq!(tight.valid_count(), inside);
        prop_assert!(tight.cell_count() <= full.cell_count());
    }

    #[test]
    fn test_disjoint_mask_is_rejected(scene in scene()) {
        prop_assume!(!scene.overlaps());
        let result = scene.input(&RasterOptions::new().with_mask(scene.mask()));
        prop_assert!(matches!(result, Err(RasterError::Geometry(_))));
    }

    #[test]
    fn test_groups_partition_valid_cells((rows, cols, values) in mask_grid()) {
        let valid: Vec<usize> = (0..values.len()).filter(|&i| values[i] != ND).collect();
        prop_assume!(!valid.is_empty());

        let mut mask = mask_from(rows, cols, values.clone());
        mask.build_subset(None).unwrap();

        let mut seen: Vec<usize> = Vec::new();
        for (group, subset) in mask.subsets() {
            for index in subset.global_indices() {
                prop_assert_eq!(values[index], *group);
                seen.push(index);
            }
        }
        seen.sort_unstable();
        prop_assert_eq!(seen, valid);
    }

    #[test]
    fn test_scatter_then_merge_restores_values((rows, cols, values) in mask_grid()) {
        prop_assume!(values.iter().any(|v| *v != ND));

        let mut mask = mask_from(rows, cols, values.clone());
        mask.build_subset(None).unwrap();
        let groups: Vec<i32> = mask.subsets().keys().copied().collect();
        for group in groups {
            let data: Vec<f64> = mask
                .subset(group)
                .unwrap()
                .global_indices()
                .map(|i| i as f64)
                .collect();
            mask.set_subset_data(group, &data).unwrap();
        }

        let merged = mask.merged_layers().unwrap();
        for (index, value) in merged[0].iter().enumerate() {
            let expected = if values[index] == ND { NODATA_VALUE } else { index as f64 };
            prop_assert_eq!(*value, expected);
        }
    }

    #[test]
    fn test_identity_rebuild_keeps_subsets((rows, cols, values) in mask_grid()) {
        prop_assume!(values.iter().any(|v| *v != ND));

        let mut mask = mask_from(rows, cols, values);
        mask.build_subset(None).unwrap();
        let before = mask.subsets().clone();
        let identity: HashMap<i32, i32> = before.keys().map(|g| (*g, *g)).collect();

        prop_assert_eq!(mask.rebuild_subset(&identity).unwrap(), before.len());
        prop_assert_eq!(mask.subsets(), &before);
    }
}
