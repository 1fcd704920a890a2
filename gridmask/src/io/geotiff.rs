//! GeoTIFF backend built on the `tiff` crate.
//!
//! Georeferencing uses the `ModelPixelScale` and `ModelTiepoint` tags, the
//! no-data value the GDAL nodata ASCII tag. Each layer is one image
//! (page) of the file.

use super::{fit_nodata, GridData, RasterBackend};
use crate::cell::{CellValue, DataType, NODATA_VALUE};
use crate::error::{RasterError, RasterResult};
use crate::header::RasterHeader;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tiff::TiffResult;

const TAG_GDAL_NODATA: u16 = 42113;

/// GeoKey directory declaring a pixel-is-area raster.
const GEO_KEY_DIRECTORY: [u16; 8] = [1, 1, 0, 1, 1025, 0, 1, 1];

/// Reads and writes single-band, multi-page GeoTIFF files.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffBackend;

impl GeoTiffBackend {
    fn open(path: &Path) -> RasterResult<Decoder<BufReader<File>>> {
        let file = File::open(path).map_err(|e| RasterError::io(path, e))?;
        Decoder::new(BufReader::new(file))
            .map(|d| d.with_limits(Limits::unlimited()))
            .map_err(|e| RasterError::codec(path, e))
    }

    fn decode_header<R: Read + Seek>(
        path: &Path,
        decoder: &mut Decoder<R>,
    ) -> RasterResult<RasterHeader> {
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| RasterError::codec(path, e))?;

        let scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .ok()
            .filter(|v| v.len() >= 2);
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .ok()
            .filter(|v| v.len() >= 6);
        let (Some(scale), Some(tiepoint)) = (scale, tiepoint) else {
            return Err(RasterError::Format(format!(
                "{} has no pixel scale or tiepoint tags",
                path.display()
            )));
        };

        let (sx, sy) = (scale[0], scale[1].abs());
        if (sx - sy).abs() > 1e-6 * sx.max(sy) {
            return Err(RasterError::Format(format!(
                "{} has non-square cells ({sx} x {sy})",
                path.display()
            )));
        }

        let nodata = decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))
            .ok()
            .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok())
            .unwrap_or(NODATA_VALUE);
        let srs = decoder
            .get_tag_ascii_string(Tag::GeoAsciiParamsTag)
            .map(|s| s.trim_matches(|c: char| c == '\0' || c == '|').to_string())
            .unwrap_or_default();

        let x_ul = tiepoint[3] - tiepoint[0] * sx;
        let y_ul = tiepoint[4] + tiepoint[1] * sx;
        let rows = height as usize;
        let header = RasterHeader::new(
            rows,
            width as usize,
            sx,
            x_ul + 0.5 * sx,
            y_ul - (rows as f64 - 0.5) * sx,
            nodata,
        )?;
        Ok(header.with_srs(srs))
    }

    fn encode<W: Write + Seek>(
        writer: W,
        header: &RasterHeader,
        layers: &[Vec<f64>],
        out_type: DataType,
    ) -> TiffResult<()> {
        let mut tiff = TiffEncoder::new(writer)?;
        for layer in layers {
            match out_type {
                DataType::UInt8 => write_page::<colortype::Gray8, _>(&mut tiff, header, &cast::<u8>(layer))?,
                DataType::Int8 => write_page::<colortype::GrayI8, _>(&mut tiff, header, &cast::<i8>(layer))?,
                DataType::UInt16 => write_page::<colortype::Gray16, _>(&mut tiff, header, &cast::<u16>(layer))?,
                DataType::Int16 => write_page::<colortype::GrayI16, _>(&mut tiff, header, &cast::<i16>(layer))?,
                DataType::UInt32 => write_page::<colortype::Gray32, _>(&mut tiff, header, &cast::<u32>(layer))?,
                DataType::Int32 => write_page::<colortype::GrayI32, _>(&mut tiff, header, &cast::<i32>(layer))?,
                DataType::Float32 => {
                    write_page::<colortype::Gray32Float, _>(&mut tiff, header, &cast::<f32>(layer))?
                }
                DataType::Float64 => write_page::<colortype::Gray64Float, _>(&mut tiff, header, layer)?,
            }
        }
        Ok(())
    }
}

fn cast<T: CellValue>(layer: &[f64]) -> Vec<T> {
    layer.iter().map(|v| T::from_f64(*v)).collect()
}

fn write_page<C, W>(
    tiff: &mut TiffEncoder<W>,
    header: &RasterHeader,
    data: &[C::Inner],
) -> TiffResult<()>
where
    C: ColorType,
    W: Write + Seek,
    [C::Inner]: TiffValue,
{
    let cs = header.cell_width();
    let pixel_scale = [cs, cs, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, header.x_min(), header.y_max(), 0.0];
    let nodata = header.nodata().to_string();

    let mut image = tiff.new_image::<C>(header.cols() as u32, header.rows() as u32)?;
    let dir = image.encoder();
    dir.write_tag(Tag::ModelPixelScaleTag, &pixel_scale[..])?;
    dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
    dir.write_tag(Tag::GeoKeyDirectoryTag, &GEO_KEY_DIRECTORY[..])?;
    dir.write_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA), nodata.as_str())?;
    if !header.srs().is_empty() {
        dir.write_tag(Tag::GeoAsciiParamsTag, header.srs())?;
    }
    image.write_data(data)
}

fn decoded_values(result: DecodingResult) -> Option<(DataType, Vec<f64>)> {
    #[allow(unreachable_patterns)]
    let decoded = match result {
        DecodingResult::U8(v) => (DataType::UInt8, v.into_iter().map(f64::from).collect()),
        DecodingResult::I8(v) => (DataType::Int8, v.into_iter().map(f64::from).collect()),
        DecodingResult::U16(v) => (DataType::UInt16, v.into_iter().map(f64::from).collect()),
        DecodingResult::I16(v) => (DataType::Int16, v.into_iter().map(f64::from).collect()),
        DecodingResult::U32(v) => (DataType::UInt32, v.into_iter().map(f64::from).collect()),
        DecodingResult::I32(v) => (DataType::Int32, v.into_iter().map(f64::from).collect()),
        DecodingResult::U64(v) => (DataType::Float64, v.into_iter().map(|x| x as f64).collect()),
        DecodingResult::I64(v) => (DataType::Float64, v.into_iter().map(|x| x as f64).collect()),
        DecodingResult::F32(v) => (DataType::Float32, v.into_iter().map(f64::from).collect()),
        DecodingResult::F64(v) => (DataType::Float64, v),
        _ => return None,
    };
    Some(decoded)
}

impl RasterBackend for GeoTiffBackend {
    fn name(&self) -> &'static str {
        "geotiff"
    }

    fn read_header(&self, path: &Path) -> RasterResult<RasterHeader> {
        let mut decoder = Self::open(path)?;
        Self::decode_header(path, &mut decoder)
    }

    fn read_full(&self, path: &Path) -> RasterResult<GridData> {
        let mut decoder = Self::open(path)?;
        let header = Self::decode_header(path, &mut decoder)?;
        let expected = header.cell_count();

        let mut data_type;
        let mut layers = Vec::new();
        loop {
            let result = decoder
                .read_image()
                .map_err(|e| RasterError::codec(path, e))?;
            let (page_type, values) = decoded_values(result).ok_or_else(|| {
                RasterError::Format(format!("{} has an unsupported sample type", path.display()))
            })?;
            if values.len() != expected {
                return Err(RasterError::Format(format!(
                    "{} page {} has {} samples, expected {} (single band only)",
                    path.display(),
                    layers.len() + 1,
                    values.len(),
                    expected
                )));
            }
            data_type = page_type;
            layers.push(values);

            if !decoder.more_images() {
                break;
            }
            decoder
                .next_image()
                .map_err(|e| RasterError::codec(path, e))?;
        }

        Ok(GridData {
            header: header.with_layers(layers.len()),
            data_type,
            layers,
        })
    }

    fn write_full(
        &self,
        path: &Path,
        header: &RasterHeader,
        layers: &[Vec<f64>],
        out_type: DataType,
    ) -> RasterResult<()> {
        if layers.is_empty() {
            return Err(RasterError::State("no layers to write".into()));
        }
        let (header, layers) = fit_nodata(header, layers, out_type);
        let file = File::create(path).map_err(|e| RasterError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        Self::encode(&mut writer, &header, &layers, out_type)
            .map_err(|e| RasterError::codec(path, e))?;
        writer.flush().map_err(|e| RasterError::io(path, e))
    }
}
