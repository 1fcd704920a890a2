//! GridMask CLI - Command-line interface
//!
//! Thin front end over the `gridmask` library: it builds mask jobs from
//! arguments or job files and prints raster summaries.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use gridmask::logging::{init_logging, LogOptions};
use std::path::PathBuf;

use commands::info::InfoArgs;
use commands::mask::MaskArgs;
use commands::run::RunArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "gridmask")]
#[command(version = gridmask::VERSION)]
#[command(about = "Mask, split and merge raster layers", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Also write log output to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Mask one or more rasters with an integer mask
    Mask(MaskArgs),

    /// Run a mask job described by an INI file
    Run(RunArgs),

    /// Show header fields and statistics of a raster
    Info(InfoArgs),
}

fn main() {
    let cli = Cli::parse();

    let mut log_options = LogOptions::new().with_verbose(cli.verbose);
    if let Some(path) = &cli.log_file {
        log_options = log_options.with_file(path);
    }
    let _guard = match init_logging(&log_options) {
        Ok(guard) => guard,
        Err(e) => CliError::LoggingInit(e).exit(),
    };

    let result = match cli.command {
        Commands::Mask(args) => commands::mask::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Info(args) => commands::info::run(args),
    };

    if let Err(e) = result {
        e.exit();
    }
}
