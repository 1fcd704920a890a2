//! Partitioning a mask into groups, regrouping and merging back.

mod common;

use common::{split_mask, write_asc, ND};
use gridmask::io::MemoryBlobStore;
use gridmask::{DataType, MaskRaster, Raster, RasterOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn indices(mask: &MaskRaster, group: i32) -> Vec<usize> {
    mask.subset(group).unwrap().global_indices().collect()
}

fn regrouped(dir: &TempDir) -> MaskRaster {
    let mut mask = MaskRaster::open(split_mask(dir.path())).unwrap();
    mask.build_subset(None).unwrap();
    let map = HashMap::from([(1, 1), (2, 2), (3, 3), (4, 1)]);
    mask.rebuild_subset(&map).unwrap();
    mask.set_subset_data(1, &[2008.0, 11.0, 9.0, 1.0, 1.0, 1.0, 1.0, 2017.0, 5.0, 1.0])
        .unwrap();
    mask.set_subset_data(2, &[2017.0, 1.0, 7.0, 2.0]).unwrap();
    mask.set_subset_data(3, &[2019.0, 2.0, 18.0, 3.0, 3.0, 3.0]).unwrap();
    mask
}

const MERGED: [f64; 20] = [
    2008.0, 2019.0, 11.0, 9.0, 2017.0, 1.0, 2.0, 1.0, 1.0, 1.0, 7.0, 18.0, 1.0, 2017.0, 5.0,
    2.0, 3.0, 3.0, 3.0, 1.0,
];

#[test]
fn test_build_subset_from_file() {
    let dir = TempDir::new().unwrap();
    let mut mask = MaskRaster::open(split_mask(dir.path())).unwrap();
    assert_eq!(mask.valid_count(), 20);
    assert_eq!(mask.build_subset(None).unwrap(), 4);

    assert_eq!(indices(&mask, 1), vec![0, 2, 3, 7, 8, 9, 14]);
    assert_eq!(indices(&mask, 2), vec![4, 5, 10, 15]);
    assert_eq!(indices(&mask, 3), vec![1, 6, 11, 16, 17, 18]);
    assert_eq!(indices(&mask, 4), vec![12, 13, 19]);

    let b = mask.subset(2).unwrap().bounds();
    assert_eq!((b.start_row, b.end_row, b.start_col, b.end_col), (0, 2, 1, 5));
}

#[test]
fn test_rebuild_then_merge() {
    let dir = TempDir::new().unwrap();
    let mask = regrouped(&dir);
    assert_eq!(mask.subsets().len(), 3);
    assert_eq!(
        indices(&mask, 1),
        vec![0, 2, 3, 7, 8, 9, 12, 13, 14, 19]
    );

    let merged = mask.merged_layers().unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(&merged[0][..20], &MERGED);
    assert!(merged[0][20..].iter().all(|v| *v == ND));
}

#[test]
fn test_merged_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let mask = regrouped(&dir);
    let out = dir.path().join("merged.asc");
    mask.output_merged_to_file(&out, DataType::Int32).unwrap();

    let merged: Raster<i32> = Raster::open(&out, &RasterOptions::default()).unwrap();
    assert_eq!(merged.rows(), 4);
    assert_eq!(merged.cols(), 7);
    assert_eq!(merged.xll_center(), 1.0);
    for (index, expected) in MERGED.iter().enumerate() {
        assert_eq!(merged.get_value_by_index(index as i64), *expected as i32);
    }
    assert_eq!(merged.get_value(3, 0), -9999);
}

#[test]
fn test_subset_tiles_written_per_group() {
    let dir = TempDir::new().unwrap();
    let mut mask = MaskRaster::open(split_mask(dir.path())).unwrap();
    mask.build_subset(None).unwrap();
    mask.set_subset_data(2, &[2017.0, 1.0, 7.0, 2.0]).unwrap();

    let template = dir.path().join("out").join("split.asc");
    assert_eq!(mask.output_subsets_to_file(&template, DataType::Int32).unwrap(), 4);

    let tile_path = dir.path().join("out").join("split_2.asc");
    let tile: Raster<i32> = Raster::open(&tile_path, &RasterOptions::default()).unwrap();
    assert_eq!((tile.rows(), tile.cols()), (3, 5));
    assert_eq!(tile.xll_center(), 3.0);
    assert_eq!(tile.yll_center(), 3.0);
    assert_eq!(tile.get_value(0, 3), 2017);
    assert_eq!(tile.get_value(0, 4), 1);
    assert_eq!(tile.get_value(1, 2), 7);
    assert_eq!(tile.get_value(2, 0), 2);
    assert_eq!(tile.get_value(0, 0), -9999);
    assert_eq!(tile.valid_count(), 4);

    for group in [1, 3, 4] {
        assert!(dir.path().join("out").join(format!("split_{group}.asc")).exists());
    }
}

#[test]
fn test_masked_raster_gathers_groups() {
    let dir = TempDir::new().unwrap();
    let mut mask = MaskRaster::open(split_mask(dir.path())).unwrap();
    mask.build_subset(None).unwrap();
    let mask = Arc::new(mask);

    // Cell values are their row-major index; group 4 cells are nodata.
    let rows: Vec<Vec<f64>> = (0..4)
        .map(|r| {
            (0..7)
                .map(|c| {
                    let index = r * 7 + c;
                    if [12, 13, 19].contains(&index) {
                        ND
                    } else {
                        index as f64
                    }
                })
                .collect()
        })
        .collect();
    let row_refs: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
    let input = write_asc(dir.path(), "index.asc", 1.0, 1.0, 2.0, &row_refs);

    let options = RasterOptions::new().with_mask(Arc::clone(&mask));
    let raster: Raster<f64> = Raster::open(&input, &options).unwrap();

    let subsets = raster.subsets();
    assert_eq!(subsets.len(), 3);
    assert!(!subsets.contains_key(&4));
    assert_eq!(subsets[&1].data(), &[0.0, 2.0, 3.0, 7.0, 8.0, 9.0, 14.0]);
    assert_eq!(subsets[&3].data(), &[1.0, 6.0, 11.0, 16.0, 17.0, 18.0]);

    let template = dir.path().join("index.asc");
    assert_eq!(raster.output_subsets_to_file(&template).unwrap(), 3);
    assert!(dir.path().join("index_2.asc").exists());
    assert!(!dir.path().join("index_4.asc").exists());
}

#[test]
fn test_subset_blobs_survive_reload() {
    let dir = TempDir::new().unwrap();
    let mask = regrouped(&dir);
    let store = MemoryBlobStore::new();
    assert_eq!(mask.output_subsets_to_blob(&store, "yield", true).unwrap(), 3);
    assert!(store.names().contains(&"watershed_yield_3".to_string()));

    let mut reloaded = MaskRaster::open(split_mask(dir.path())).unwrap();
    reloaded.build_subset(Some(&HashMap::from([(4, 1)]))).unwrap();
    reloaded.read_subsets_from_blob(&store, "yield", true).unwrap();
    assert_eq!(reloaded.merged_layers().unwrap(), mask.merged_layers().unwrap());
}
