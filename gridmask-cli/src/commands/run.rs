//! Run command - execute a job file.

use clap::Args;
use gridmask::MaskJob;
use std::path::PathBuf;
use tracing::info;

use crate::error::CliError;

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// INI job file
    pub job: PathBuf,

    /// Override the job's worker thread count
    #[arg(long)]
    pub threads: Option<usize>,
}

/// Run the run command.
pub fn run(args: RunArgs) -> Result<(), CliError> {
    let mut job = MaskJob::from_ini_file(&args.job)?;
    if let Some(threads) = args.threads {
        if threads == 0 {
            return Err(CliError::Args("--threads must be at least 1".to_string()));
        }
        job = job.with_threads(threads);
    }
    info!(job = %args.job.display(), "Loaded job file");

    super::execute(&job)?;
    Ok(())
}
