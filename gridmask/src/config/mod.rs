//! Masking job requests.
//!
//! A [`MaskJob`] names a mask, how its selection is written (one raster per
//! input, or one tile per mask group) and the inputs to process. Jobs are
//! built in code with the `with_*` methods or loaded from an INI file:
//!
//! ```ini
//! [mask]
//! path = dem_mask.tif
//! mode = multiple
//!
//! [run]
//! threads = 4
//!
//! [input.dem]
//! path = dem.tif
//! default = -9999
//! output = dem_masked.tif
//! type = float
//! ```

mod parser;

use crate::cell::{DataType, NODATA_VALUE};
use crate::io::naming;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors from building or loading a job.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the job file
    #[error("Failed to read job file: {0}")]
    ReadError(#[from] ini::Error),

    /// A required key is absent
    #[error("Missing configuration: {section}.{key}")]
    MissingKey { section: String, key: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Nothing to process
    #[error("Job has no inputs")]
    NoInputs,
}

/// How masked results are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsetMode {
    /// One masked raster per input.
    #[default]
    Single,
    /// One tile per mask group and input.
    Multiple,
}

impl fmt::Display for SubsetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubsetMode::Single => write!(f, "single"),
            SubsetMode::Multiple => write!(f, "multiple"),
        }
    }
}

impl FromStr for SubsetMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(SubsetMode::Single),
            "multiple" => Ok(SubsetMode::Multiple),
            other => Err(format!("unknown subset mode '{other}'")),
        }
    }
}

/// One raster to mask.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskInput {
    pub input: PathBuf,
    /// Fill for mask-valid cells with no input value.
    pub default_value: f64,
    /// Output file, or the tile template in [`SubsetMode::Multiple`].
    pub output: PathBuf,
    pub out_type: Option<DataType>,
}

impl MaskInput {
    /// Input with nodata fill, `<core>_masked.<ext>` output and the
    /// in-memory output type.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        let output = naming::masked_output_path(&input);
        Self {
            input,
            default_value: NODATA_VALUE,
            output,
            out_type: None,
        }
    }

    pub fn with_default_value(mut self, default_value: f64) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_out_type(mut self, out_type: Option<DataType>) -> Self {
        self.out_type = out_type;
        self
    }
}

/// A complete masking request.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskJob {
    pub mask_path: PathBuf,
    pub mode: SubsetMode,
    /// Worker threads, at least one.
    pub threads: usize,
    pub inputs: Vec<MaskInput>,
}

impl MaskJob {
    pub fn new(mask_path: impl Into<PathBuf>) -> Self {
        Self {
            mask_path: mask_path.into(),
            mode: SubsetMode::default(),
            threads: default_threads(),
            inputs: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: SubsetMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the worker count; zero is clamped to one.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_input(mut self, input: MaskInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Check the job before running it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::InvalidValue {
                section: "run".to_string(),
                key: "threads".to_string(),
                value: self.threads.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.mask_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingKey {
                section: "mask".to_string(),
                key: "path".to_string(),
            });
        }
        if self.inputs.is_empty() {
            return Err(ConfigError::NoInputs);
        }
        Ok(())
    }

    /// Load a job from an INI file. Relative paths are resolved against
    /// the file's directory.
    pub fn from_ini_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ini = ini::Ini::load_from_file(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        parser::parse_job(&ini, base)
    }

    /// Build a job from already parsed INI content.
    pub fn from_ini(ini: &ini::Ini, base_dir: &Path) -> Result<Self, ConfigError> {
        parser::parse_job(ini, base_dir)
    }
}

/// Available parallelism, or one when it cannot be queried.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
