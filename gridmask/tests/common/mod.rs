//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const ND: f64 = -9999.0;

/// Write an ESRI ASCII grid with cell-center origin.
pub fn write_asc(
    dir: &Path,
    name: &str,
    xll: f64,
    yll: f64,
    cellsize: f64,
    rows: &[&[f64]],
) -> PathBuf {
    let mut text = format!(
        "ncols {}\nnrows {}\nxllcenter {}\nyllcenter {}\ncellsize {}\nNODATA_value -9999\n",
        rows[0].len(),
        rows.len(),
        xll,
        yll,
        cellsize
    );
    for row in rows {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        text.push_str(&line.join(" "));
        text.push('\n');
    }
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

/// 4 x 7 mask with four groups; the last row and the end of row 2 are nodata.
pub fn split_mask(dir: &Path) -> PathBuf {
    write_asc(
        dir,
        "watershed.asc",
        1.0,
        1.0,
        2.0,
        &[
            &[1.0, 3.0, 1.0, 1.0, 2.0, 2.0, 3.0],
            &[1.0, 1.0, 1.0, 2.0, 3.0, 4.0, 4.0],
            &[1.0, 2.0, 3.0, 3.0, 3.0, 4.0, ND],
            &[ND, ND, ND, ND, ND, ND, ND],
        ],
    )
}

/// 2 x 2 mask selecting the anti-diagonal, inside the 4 x 3 input.
pub fn within_mask(dir: &Path) -> PathBuf {
    write_asc(dir, "within.asc", 3.0, 3.0, 2.0, &[&[ND, 1.0], &[1.0, ND]])
}

/// 4 x 3 input covering the 2 x 2 mask.
pub fn within_input(dir: &Path) -> PathBuf {
    write_asc(
        dir,
        "input.asc",
        1.0,
        1.0,
        2.0,
        &[
            &[1.0, 2.0, 3.0],
            &[6.0, 7.0, 4.0],
            &[8.0, 5.0, 9.0],
            &[10.0, 11.0, 12.0],
        ],
    )
}
