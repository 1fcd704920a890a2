//! CLI command implementations.
//!
//! - [`info`] - Print a raster's header and statistics
//! - [`mask`] - Mask rasters given on the command line
//! - [`run`] - Run a job file

pub mod info;
pub mod mask;
pub mod run;

use gridmask::pipeline::{run_mask_job, JobReport};
use gridmask::MaskJob;

use crate::error::CliError;

/// Run a job and print a summary.
///
/// Failed inputs are listed but do not fail the command; only problems
/// that stop the whole job do.
pub(crate) fn execute(job: &MaskJob) -> Result<JobReport, CliError> {
    println!("Mask:    {}", job.mask_path.display());
    println!("Mode:    {}", job.mode);
    println!("Inputs:  {}", job.inputs.len());
    println!("Threads: {}", job.threads);
    println!();

    let report = run_mask_job(job)?;

    for path in &report.succeeded {
        println!("  ok      {}", path.display());
    }
    for (path, message) in &report.failed {
        println!("  FAILED  {} ({})", path.display(), message);
    }
    if !report.is_success() {
        println!();
        println!(
            "{} of {} inputs failed, run with --verbose for details",
            report.failed.len(),
            job.inputs.len()
        );
    }
    Ok(report)
}
