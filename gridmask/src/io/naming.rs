//! File and blob naming conventions.

use std::path::{Path, PathBuf};

/// Core name of a path: the file name without directory or extension.
pub fn core_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// File name of one subset tile: `<core>_<group>.<ext>`.
pub fn subset_file_name(core: &str, group: i32, ext: &str) -> String {
    format!("{core}_{group}.{ext}")
}

/// File name of one layer of a multi-layer write: `<core>_<layer>.<ext>`.
pub fn layer_file_name(core: &str, layer: usize, ext: &str) -> String {
    format!("{core}_{layer}.{ext}")
}

/// Blob name of one subset: `<core>_<suffix>_<group>`, or
/// `<core>_<suffix>_valid_<group>` for valid-only payloads.
pub fn subset_blob_name(core: &str, suffix: &str, group: i32, valid_only: bool) -> String {
    if valid_only {
        format!("{core}_{suffix}_valid_{group}")
    } else {
        format!("{core}_{suffix}_{group}")
    }
}

/// Default output of a masking run: `<dir>/<core>_masked.<ext>`.
pub fn masked_output_path(input: &Path) -> PathBuf {
    let core = core_name(input);
    let name = match input.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{core}_masked.{ext}"),
        None => format!("{core}_masked"),
    };
    input.with_file_name(name)
}
