//! Info command - print a raster's header and statistics.

use clap::Args;
use gridmask::{Raster, RasterOptions};
use std::path::PathBuf;

use crate::error::CliError;

/// Arguments for the info command.
#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Raster file (.asc or .tif)
    pub path: PathBuf,
}

/// Run the info command.
pub fn run(args: InfoArgs) -> Result<(), CliError> {
    let raster: Raster<f64> = Raster::open(&args.path, &RasterOptions::default())?;
    print!("{}", describe(&raster));
    Ok(())
}

fn describe(raster: &Raster<f64>) -> String {
    let mut out = String::new();
    out.push_str(&format!("File:        {}\n", raster.file_path().display()));
    out.push_str(&format!("Type:        {}\n", raster.data_type()));
    out.push_str(&format!("Size:        {} rows x {} cols\n", raster.rows(), raster.cols()));
    out.push_str(&format!("Layers:      {}\n", raster.layers()));
    out.push_str(&format!("Cell size:   {}\n", raster.cell_width()));
    out.push_str(&format!(
        "Origin:      {}, {} (lower-left cell center)\n",
        raster.xll_center(),
        raster.yll_center()
    ));
    out.push_str(&format!("Nodata:      {}\n", raster.nodata()));
    if !raster.srs().is_empty() {
        out.push_str(&format!("SRS:         {}\n", raster.srs()));
    }

    for layer in 0..raster.layers().max(0) as usize {
        let Some(stats) = raster.statistics(layer) else {
            continue;
        };
        out.push_str(&format!("\nLayer {}\n", layer + 1));
        out.push_str(&format!("  Valid:     {}\n", stats.valid_count));
        out.push_str(&format!("  Min:       {}\n", stats.min));
        out.push_str(&format!("  Max:       {}\n", stats.max));
        out.push_str(&format!("  Mean:      {:.6}\n", stats.mean));
        out.push_str(&format!("  Std dev:   {:.6}\n", stats.std_dev));
        out.push_str(&format!("  Range:     {}\n", stats.range()));
    }
    out
}
