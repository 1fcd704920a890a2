//! CLI error handling with user-friendly messages.

use gridmask::config::ConfigError;
use gridmask::pipeline::PipelineError;
use gridmask::RasterError;
use std::fmt;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Invalid command-line arguments
    Args(String),
    /// Job file could not be loaded
    Config(ConfigError),
    /// Job aborted before processing inputs
    Pipeline(PipelineError),
    /// Raster could not be read
    Raster(RasterError),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Pipeline(PipelineError::Mask {
                source: RasterError::Geometry(_),
                ..
            })
            | CliError::Raster(RasterError::Geometry(_)) => {
                eprintln!();
                eprintln!("Mask and input must share a cell size and overlap.");
                eprintln!("Check both headers with: gridmask info <file>");
            }
            CliError::Raster(RasterError::Format(_)) => {
                eprintln!();
                eprintln!("Supported formats: .asc (ESRI ASCII grid), .tif/.tiff (GeoTIFF)");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Args(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Pipeline(e) => write!(f, "{}", e),
            CliError::Raster(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::Pipeline(e) => Some(e),
            CliError::Raster(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        CliError::Pipeline(e)
    }
}

impl From<RasterError> for CliError {
    fn from(e: RasterError) -> Self {
        CliError::Raster(e)
    }
}
