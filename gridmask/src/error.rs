//! Error types for raster operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while reading, masking, partitioning or writing rasters.
///
/// Accessors on [`Raster`](crate::raster::Raster) never return these; they
/// report absent data through sentinel values instead. Everything that
/// touches a file, a blob store or a geometry relationship does.
#[derive(Debug, Error)]
pub enum RasterError {
    /// Unsupported extension, malformed header or unparsable values.
    #[error("format error: {0}")]
    Format(String),

    /// File system failure on a specific path.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cell size mismatch or no overlap between a mask and an input.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Operation not valid in the current state (blank raster, no subsets).
    #[error("invalid state: {0}")]
    State(String),

    /// A value buffer did not match the expected length.
    #[error("size mismatch: expected {expected} values, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Encoder or decoder failure reported by a storage backend.
    #[error("codec error on {path:?}: {message}")]
    Codec { path: PathBuf, message: String },
}

impl RasterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RasterError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn codec(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        RasterError::Codec {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result alias for raster operations.
pub type RasterResult<T> = Result<T, RasterError>;
