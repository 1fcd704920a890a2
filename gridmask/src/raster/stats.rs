//! Per-layer summary statistics.

use crate::cell::{CellValue, NODATA_VALUE};

/// Statistics over the valid (non-nodata) values of one layer.
///
/// When a layer has no valid values every field except `valid_count`
/// holds [`NODATA_VALUE`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterStats {
    pub valid_count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl RasterStats {
    pub const EMPTY: RasterStats = RasterStats {
        valid_count: 0,
        min: NODATA_VALUE,
        max: NODATA_VALUE,
        mean: NODATA_VALUE,
        std_dev: NODATA_VALUE,
    };

    pub fn range(&self) -> f64 {
        if self.valid_count == 0 {
            NODATA_VALUE
        } else {
            self.max - self.min
        }
    }
}

/// Compute statistics in one pass (Welford) skipping `nodata` and NaN.
pub fn compute_stats<T, I>(values: I, nodata: T) -> RasterStats
where
    T: CellValue,
    I: IntoIterator<Item = T>,
{
    let mut count = 0usize;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut mean = 0.0;
    let mut m2 = 0.0;

    for value in values {
        if value.same_as(nodata) || value.is_nan() {
            continue;
        }
        let v = value.to_f64();
        count += 1;
        min = min.min(v);
        max = max.max(v);
        let delta = v - mean;
        mean += delta / count as f64;
        m2 += delta * (v - mean);
    }

    if count == 0 {
        return RasterStats::EMPTY;
    }
    RasterStats {
        valid_count: count,
        min,
        max,
        mean,
        std_dev: (m2 / count as f64).sqrt(),
    }
}
