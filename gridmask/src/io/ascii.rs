//! ESRI ASCII grid backend.

use super::naming::layer_file_name;
use super::{fit_nodata, GridData, RasterBackend};
use crate::cell::DataType;
use crate::error::{RasterError, RasterResult};
use crate::header::{parse_ascii_header, RasterHeader};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const HEADER_LINES: usize = 6;

/// Reads and writes single-layer `.asc` files.
///
/// Multi-layer rasters are written as one file per layer named
/// `<core>_<n>.asc` (1-based) next to the requested path.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiGridBackend;

impl AsciiGridBackend {
    fn parse(path: &Path, text: &str) -> RasterResult<GridData> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = parse_ascii_header(lines.by_ref().take(HEADER_LINES))?;

        let expected = header.cell_count();
        let mut values = Vec::with_capacity(expected);
        let mut all_integers = true;
        for token in lines.flat_map(str::split_whitespace) {
            let value: f64 = token.parse().map_err(|_| {
                RasterError::Format(format!(
                    "invalid cell value '{token}' in {}",
                    path.display()
                ))
            })?;
            all_integers &= token.parse::<i64>().is_ok();
            values.push(value);
        }
        if values.len() != expected {
            return Err(RasterError::Format(format!(
                "{} has {} values, header declares {}",
                path.display(),
                values.len(),
                expected
            )));
        }

        let data_type = if all_integers {
            DataType::Int32
        } else {
            DataType::Float32
        };
        Ok(GridData {
            header,
            data_type,
            layers: vec![values],
        })
    }

    fn write_layer(
        path: &Path,
        header: &RasterHeader,
        values: &[f64],
        out_type: DataType,
    ) -> RasterResult<()> {
        let file = fs::File::create(path).map_err(|e| RasterError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        Self::write_text(&mut writer, header, values, out_type)
            .map_err(|e| RasterError::io(path, e))
    }

    fn write_text<W: Write>(
        writer: &mut W,
        header: &RasterHeader,
        values: &[f64],
        out_type: DataType,
    ) -> std::io::Result<()> {
        writeln!(writer, "NCOLS {}", header.cols())?;
        writeln!(writer, "NROWS {}", header.rows())?;
        writeln!(writer, "XLLCENTER {}", header.xll_center())?;
        writeln!(writer, "YLLCENTER {}", header.yll_center())?;
        writeln!(writer, "CELLSIZE {}", header.cell_width())?;
        writeln!(
            writer,
            "NODATA_VALUE {}",
            format_value(header.nodata(), out_type)
        )?;
        for row in values.chunks(header.cols()) {
            let line: Vec<String> = row.iter().map(|v| format_value(*v, out_type)).collect();
            writeln!(writer, "{}", line.join(" "))?;
        }
        writer.flush()
    }
}

/// Format a value as it would be stored in `out_type`.
fn format_value(value: f64, out_type: DataType) -> String {
    match out_type {
        DataType::Float32 => format!("{}", value as f32),
        DataType::Float64 => format!("{value}"),
        integer => format!("{}", integer.cast(value) as i64),
    }
}

/// Path of the file holding `layer` (0-based) of a multi-layer write.
fn layer_path(path: &Path, layer: usize) -> PathBuf {
    let core = path.file_stem().and_then(|s| s.to_str()).unwrap_or("layer");
    path.with_file_name(layer_file_name(core, layer + 1, "asc"))
}

impl RasterBackend for AsciiGridBackend {
    fn name(&self) -> &'static str {
        "ascii-grid"
    }

    fn read_header(&self, path: &Path) -> RasterResult<RasterHeader> {
        let file = fs::File::open(path).map_err(|e| RasterError::io(path, e))?;
        let mut lines = Vec::with_capacity(HEADER_LINES);
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| RasterError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            lines.push(line);
            if lines.len() == HEADER_LINES {
                break;
            }
        }
        parse_ascii_header(lines.iter().map(String::as_str))
    }

    fn read_full(&self, path: &Path) -> RasterResult<GridData> {
        let text = fs::read_to_string(path).map_err(|e| RasterError::io(path, e))?;
        Self::parse(path, &text)
    }

    fn write_full(
        &self,
        path: &Path,
        header: &RasterHeader,
        layers: &[Vec<f64>],
        out_type: DataType,
    ) -> RasterResult<()> {
        let (header, layers) = fit_nodata(header, layers, out_type);
        match &layers[..] {
            [] => Err(RasterError::State("no layers to write".into())),
            [single] => Self::write_layer(path, &header, single, out_type),
            many => {
                for (layer, values) in many.iter().enumerate() {
                    Self::write_layer(&layer_path(path, layer), &header, values, out_type)?;
                }
                Ok(())
            }
        }
    }
}
