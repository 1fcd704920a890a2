//! Mask command - mask rasters given on the command line.

use clap::{Args, ValueEnum};
use gridmask::config::default_threads;
use gridmask::{DataType, MaskInput, MaskJob, SubsetMode, NODATA_VALUE};
use std::path::PathBuf;

use crate::error::CliError;

/// Output layout selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ModeArg {
    /// One masked raster per input
    Single,
    /// One tile per mask group and input
    Multiple,
}

impl From<ModeArg> for SubsetMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Single => SubsetMode::Single,
            ModeArg::Multiple => SubsetMode::Multiple,
        }
    }
}

/// Arguments for the mask command.
///
/// `--default-value`, `--output` and `--out-type` pair up with `--input`
/// by position; missing trailing entries take their defaults.
#[derive(Debug, Args)]
pub struct MaskArgs {
    /// Integer mask raster (.asc or .tif)
    #[arg(long)]
    pub mask: PathBuf,

    /// Raster to mask (repeatable)
    #[arg(long = "input", required = true, value_name = "PATH")]
    pub inputs: Vec<PathBuf>,

    /// Fill for mask cells without input data (repeatable)
    #[arg(long = "default-value", value_name = "VALUE", allow_negative_numbers = true)]
    pub default_values: Vec<f64>,

    /// Output path, or tile template in multiple mode (repeatable)
    #[arg(long = "output", value_name = "PATH")]
    pub outputs: Vec<PathBuf>,

    /// Output type: uint8, int8, uint16, int16, uint32, int32, float, double (repeatable)
    #[arg(long = "out-type", value_name = "TYPE")]
    pub out_types: Vec<String>,

    /// Write one raster per input or one tile per mask group
    #[arg(long, value_enum, default_value = "single")]
    pub mode: ModeArg,

    /// Worker threads (default: available parallelism)
    #[arg(long)]
    pub threads: Option<usize>,
}

impl MaskArgs {
    /// Build the job these arguments describe.
    pub fn to_job(&self) -> Result<MaskJob, CliError> {
        let n = self.inputs.len();
        for (flag, count) in [
            ("--default-value", self.default_values.len()),
            ("--output", self.outputs.len()),
            ("--out-type", self.out_types.len()),
        ] {
            if count > n {
                return Err(CliError::Args(format!(
                    "{flag} given {count} times for {n} inputs"
                )));
            }
        }
        if self.threads == Some(0) {
            return Err(CliError::Args("--threads must be at least 1".to_string()));
        }

        let mut job = MaskJob::new(&self.mask)
            .with_mode(self.mode.into())
            .with_threads(self.threads.unwrap_or_else(default_threads));

        for (i, path) in self.inputs.iter().enumerate() {
            let out_type = match self.out_types.get(i) {
                Some(s) => DataType::parse_optional(s)
                    .map_err(|e| CliError::Args(format!("--out-type: {e}")))?,
                None => None,
            };
            let mut input = MaskInput::new(path)
                .with_default_value(self.default_values.get(i).copied().unwrap_or(NODATA_VALUE))
                .with_out_type(out_type);
            if let Some(output) = self.outputs.get(i) {
                input = input.with_output(output);
            }
            job = job.with_input(input);
        }
        Ok(job)
    }
}

/// Run the mask command.
pub fn run(args: MaskArgs) -> Result<(), CliError> {
    let job = args.to_job()?;
    super::execute(&job)?;
    Ok(())
}
