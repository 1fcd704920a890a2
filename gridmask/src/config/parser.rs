//! INI parsing for `MaskJob`.
//!
//! This is the single place where job-file key names are mapped to fields.

use ini::{Ini, Properties};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{ConfigError, MaskInput, MaskJob, SubsetMode};
use crate::cell::DataType;

const INPUT_PREFIX: &str = "input.";

pub(super) fn parse_job(ini: &Ini, base: &Path) -> Result<MaskJob, ConfigError> {
    // [mask] section
    let mask = ini.section(Some("mask")).ok_or_else(|| missing("mask", "path"))?;
    let mask_path = mask
        .get("path")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing("mask", "path"))?;
    let mut job = MaskJob::new(resolve(base, mask_path));

    if let Some(v) = mask.get("mode") {
        job.mode = v.parse::<SubsetMode>().map_err(|reason| ConfigError::InvalidValue {
            section: "mask".to_string(),
            key: "mode".to_string(),
            value: v.to_string(),
            reason,
        })?;
    }

    // [run] section
    if let Some(section) = ini.section(Some("run")) {
        if let Some(v) = section.get("threads") {
            job.threads = match v.trim().parse::<usize>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        section: "run".to_string(),
                        key: "threads".to_string(),
                        value: v.to_string(),
                        reason: "must be a positive integer".to_string(),
                    })
                }
            };
        }
    }

    // [input.<name>] sections
    for (name, section) in ini.iter() {
        let Some(name) = name else { continue };
        if !name.starts_with(INPUT_PREFIX) {
            continue;
        }
        let input = parse_input(name, section, base)?;
        if !input.input.exists() {
            warn!(section = name, path = %input.input.display(), "Input file not found, skipping");
            continue;
        }
        job.inputs.push(input);
    }

    job.validate()?;
    Ok(job)
}

fn parse_input(name: &str, section: &Properties, base: &Path) -> Result<MaskInput, ConfigError> {
    let path = section
        .get("path")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(name, "path"))?;
    let mut input = MaskInput::new(resolve(base, path));

    if let Some(v) = section.get("default") {
        input.default_value = v.trim().parse::<f64>().map_err(|_| ConfigError::InvalidValue {
            section: name.to_string(),
            key: "default".to_string(),
            value: v.to_string(),
            reason: "must be a number".to_string(),
        })?;
    }
    if let Some(v) = section.get("output") {
        let v = v.trim();
        if !v.is_empty() {
            input.output = resolve(base, v);
        }
    }
    if let Some(v) = section.get("type") {
        input.out_type = DataType::parse_optional(v).map_err(|e| ConfigError::InvalidValue {
            section: name.to_string(),
            key: "type".to_string(),
            value: v.to_string(),
            reason: e.to_string(),
        })?;
    }
    Ok(input)
}

fn missing(section: &str, key: &str) -> ConfigError {
    ConfigError::MissingKey {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn resolve(base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn job_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dem.asc"), "").unwrap();
        fs::write(dir.path().join("slope.asc"), "").unwrap();
        dir
    }

    #[test]
    fn test_parse_full_job() {
        let dir = job_dir();
        let ini = Ini::load_from_str(
            "[mask]\npath = mask.asc\nmode = multiple\n\
             [run]\nthreads = 3\n\
             [input.dem]\npath = dem.asc\ndefault = 0\noutput = out/dem.asc\ntype = int16\n\
             [input.slope]\npath = slope.asc\n",
        )
        .unwrap();

        let job = parse_job(&ini, dir.path()).unwrap();
        assert_eq!(job.mask_path, dir.path().join("mask.asc"));
        assert_eq!(job.mode, SubsetMode::Multiple);
        assert_eq!(job.threads, 3);
        assert_eq!(job.inputs.len(), 2);

        let dem = &job.inputs[0];
        assert_eq!(dem.default_value, 0.0);
        assert_eq!(dem.output, dir.path().join("out/dem.asc"));
        assert_eq!(dem.out_type, Some(DataType::Int16));

        let slope = &job.inputs[1];
        assert_eq!(slope.output, dir.path().join("slope_masked.asc"));
        assert_eq!(slope.out_type, None);
    }

    #[test]
    fn test_missing_input_file_is_skipped() {
        let dir = job_dir();
        let ini = Ini::load_from_str(
            "[mask]\npath = mask.asc\n\
             [input.dem]\npath = dem.asc\n\
             [input.gone]\npath = gone.asc\n",
        )
        .unwrap();
        let job = parse_job(&ini, dir.path()).unwrap();
        assert_eq!(job.inputs.len(), 1);
        assert_eq!(job.mode, SubsetMode::Single);
    }

    #[test]
    fn test_missing_mask_path() {
        let ini = Ini::load_from_str("[run]\nthreads = 2\n").unwrap();
        assert!(matches!(
            parse_job(&ini, Path::new(".")),
            Err(ConfigError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_invalid_threads() {
        let dir = job_dir();
        let ini = Ini::load_from_str(
            "[mask]\npath = mask.asc\n[run]\nthreads = 0\n[input.dem]\npath = dem.asc\n",
        )
        .unwrap();
        let err = parse_job(&ini, dir.path()).unwrap_err();
        assert!(err.to_string().contains("run.threads"));
    }

    #[test]
    fn test_invalid_type_and_mode() {
        let dir = job_dir();
        let ini = Ini::load_from_str(
            "[mask]\npath = mask.asc\n[input.dem]\npath = dem.asc\ntype = complex\n",
        )
        .unwrap();
        assert!(parse_job(&ini, dir.path()).is_err());

        let ini = Ini::load_from_str("[mask]\npath = mask.asc\nmode = many\n").unwrap();
        assert!(matches!(
            parse_job(&ini, dir.path()),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unknown_type_means_none() {
        let dir = job_dir();
        let ini = Ini::load_from_str(
            "[mask]\npath = mask.asc\n[input.dem]\npath = dem.asc\ntype = unknown\n",
        )
        .unwrap();
        let job = parse_job(&ini, dir.path()).unwrap();
        assert_eq!(job.inputs[0].out_type, None);
    }

    #[test]
    fn test_absolute_paths_kept() {
        let dir = job_dir();
        let dem = dir.path().join("dem.asc");
        let text = format!("[mask]\npath = /srv/mask.asc\n[input.dem]\npath = {}\n", dem.display());
        let ini = Ini::load_from_str(&text).unwrap();
        let job = parse_job(&ini, Path::new("/elsewhere")).unwrap();
        assert_eq!(job.mask_path, PathBuf::from("/srv/mask.asc"));
        assert_eq!(job.inputs[0].input, dem);
    }
}
