//! Named binary blob storage.
//!
//! Rasters and subsets can be persisted as bincode-encoded blobs under a
//! string name. Two stores are provided:
//!
//! - [`MemoryBlobStore`]: an in-process map, useful for tests and for
//!   handing data between pipeline stages.
//! - [`DirectoryBlobStore`]: one `<name>.blob` file per blob in a directory.

use crate::cell::DataType;
use crate::error::{RasterError, RasterResult};
use crate::header::RasterHeader;
use crate::raster::CellPos;
use crate::subset::SubsetBounds;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A store of named binary blobs.
///
/// Implementations must be thread-safe (`Send + Sync`) since subsets are
/// written from a worker pool.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `name`, replacing any previous blob.
    fn write_blob(&self, name: &str, bytes: Vec<u8>) -> RasterResult<()>;

    /// Fetch the blob stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns `RasterError::Io` with kind `NotFound` for unknown names.
    fn read_blob(&self, name: &str) -> RasterResult<Vec<u8>>;

    /// Remove a blob. Returns `true` if it existed.
    fn remove_blob(&self, name: &str) -> RasterResult<bool>;

    fn contains_blob(&self, name: &str) -> bool;
}

fn not_found(name: &str) -> RasterError {
    RasterError::io(
        name,
        std::io::Error::new(ErrorKind::NotFound, format!("no blob named '{name}'")),
    )
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Names of all stored blobs, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl BlobStore for MemoryBlobStore {
    fn write_blob(&self, name: &str, bytes: Vec<u8>) -> RasterResult<()> {
        self.blobs.write().insert(name.to_string(), bytes);
        Ok(())
    }

    fn read_blob(&self, name: &str) -> RasterResult<Vec<u8>> {
        self.blobs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    fn remove_blob(&self, name: &str) -> RasterResult<bool> {
        Ok(self.blobs.write().remove(name).is_some())
    }

    fn contains_blob(&self, name: &str) -> bool {
        self.blobs.read().contains_key(name)
    }
}

/// Directory-backed blob store.
#[derive(Debug, Clone)]
pub struct DirectoryBlobStore {
    root: PathBuf,
}

impl DirectoryBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> RasterResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| RasterError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, name: &str) -> RasterResult<PathBuf> {
        let bad_char = |c: char| c == '/' || c == '\\';
        if name.is_empty() || name.contains(bad_char) || name == "." || name == ".." {
            return Err(RasterError::Format(format!("invalid blob name '{name}'")));
        }
        Ok(self.root.join(format!("{name}.blob")))
    }
}

impl BlobStore for DirectoryBlobStore {
    fn write_blob(&self, name: &str, bytes: Vec<u8>) -> RasterResult<()> {
        let path = self.blob_path(name)?;
        fs::write(&path, bytes).map_err(|e| RasterError::io(&path, e))
    }

    fn read_blob(&self, name: &str) -> RasterResult<Vec<u8>> {
        let path = self.blob_path(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found(name)),
            Err(e) => Err(RasterError::io(&path, e)),
        }
    }

    fn remove_blob(&self, name: &str) -> RasterResult<bool> {
        let path = self.blob_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RasterError::io(&path, e)),
        }
    }

    fn contains_blob(&self, name: &str) -> bool {
        self.blob_path(name).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Cell values carried by a blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlobPayload {
    /// Every cell of the grid, per layer, row-major.
    Full { layers: Vec<Vec<f64>> },

    /// Only selected cells: sorted positions and cell-major values.
    Valid {
        positions: Vec<CellPos>,
        layers: usize,
        values: Vec<f64>,
    },
}

impl BlobPayload {
    /// Expand to per-layer, row-major buffers over `header`'s grid.
    pub fn into_dense(self, header: &RasterHeader) -> RasterResult<Vec<Vec<f64>>> {
        let cells = header.cell_count();
        match self {
            BlobPayload::Full { layers } => {
                if let Some(bad) = layers.iter().find(|l| l.len() != cells) {
                    return Err(RasterError::SizeMismatch {
                        expected: cells,
                        actual: bad.len(),
                    });
                }
                Ok(layers)
            }
            BlobPayload::Valid {
                positions,
                layers,
                values,
            } => {
                let layers = layers.max(1);
                if values.len() != positions.len() * layers {
                    return Err(RasterError::SizeMismatch {
                        expected: positions.len() * layers,
                        actual: values.len(),
                    });
                }
                let mut out = vec![vec![header.nodata(); cells]; layers];
                for (ordinal, pos) in positions.iter().enumerate() {
                    if pos.row >= header.rows() || pos.col >= header.cols() {
                        return Err(RasterError::Geometry(format!(
                            "blob position ({}, {}) outside {}x{} grid",
                            pos.row,
                            pos.col,
                            header.rows(),
                            header.cols()
                        )));
                    }
                    let index = pos.index(header.cols());
                    for (layer, buf) in out.iter_mut().enumerate() {
                        buf[index] = values[ordinal * layers + layer];
                    }
                }
                Ok(out)
            }
        }
    }
}

/// A whole raster as stored in a blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterBlob {
    pub header: RasterHeader,
    pub data_type: DataType,
    pub payload: BlobPayload,
}

/// One subset as stored in a blob. `header` describes the subset tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetBlob {
    pub group: i32,
    pub header: RasterHeader,
    pub bounds: SubsetBounds,
    pub payload: BlobPayload,
}

pub(crate) fn encode<T: Serialize>(name: &str, value: &T) -> RasterResult<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| RasterError::Format(format!("failed to encode blob '{name}': {e}")))
}

pub(crate) fn decode<T: DeserializeOwned>(name: &str, bytes: &[u8]) -> RasterResult<T> {
    bincode::deserialize(bytes)
        .map_err(|e| RasterError::Format(format!("corrupt blob '{name}': {e}")))
}
