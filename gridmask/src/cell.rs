//! Numeric cell types.
//!
//! A [`Raster`](crate::raster::Raster) is generic over any type implementing
//! [`CellValue`]. Backends exchange values as `f64`, so every cell type
//! converts to and from `f64` with plain `as` casts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default no-data value used when a source does not declare one.
pub const NODATA_VALUE: f64 = -9999.0;

/// Element types a raster can be stored or written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// Canonical lower-case name.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::UInt8 => "uint8",
            DataType::Int8 => "int8",
            DataType::UInt16 => "uint16",
            DataType::Int16 => "int16",
            DataType::UInt32 => "uint32",
            DataType::Int32 => "int32",
            DataType::Float32 => "float",
            DataType::Float64 => "double",
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Parse a type name where `unknown` (or an empty string) means "no override".
    pub fn parse_optional(s: &str) -> Result<Option<Self>, ParseDataTypeError> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unknown") {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }

    /// Convert `value` the way it would be stored as this type.
    pub fn cast(&self, value: f64) -> f64 {
        match self {
            DataType::UInt8 => value as u8 as f64,
            DataType::Int8 => value as i8 as f64,
            DataType::UInt16 => value as u16 as f64,
            DataType::Int16 => value as i16 as f64,
            DataType::UInt32 => value as u32 as f64,
            DataType::Int32 => value as i32 as f64,
            DataType::Float32 => value as f32 as f64,
            DataType::Float64 => value,
        }
    }

    /// No-data value to use when storing as this type.
    ///
    /// Returns `nodata` when the type holds it exactly. Otherwise integer
    /// types fall back to their own sentinel: the maximum for unsigned
    /// types, the minimum for signed ones.
    pub fn nodata_for(&self, nodata: f64) -> f64 {
        match self {
            DataType::Float32 | DataType::Float64 => self.cast(nodata),
            _ if self.cast(nodata) == nodata => nodata,
            DataType::UInt8 => f64::from(u8::MAX),
            DataType::UInt16 => f64::from(u16::MAX),
            DataType::UInt32 => f64::from(u32::MAX),
            DataType::Int8 => f64::from(i8::MIN),
            DataType::Int16 => f64::from(i16::MIN),
            DataType::Int32 => f64::from(i32::MIN),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unrecognized data type name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported data type '{0}'")]
pub struct ParseDataTypeError(pub String);

impl FromStr for DataType {
    type Err = ParseDataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uint8" | "byte" => Ok(DataType::UInt8),
            "int8" => Ok(DataType::Int8),
            "uint16" => Ok(DataType::UInt16),
            "int16" => Ok(DataType::Int16),
            "uint32" => Ok(DataType::UInt32),
            "int32" => Ok(DataType::Int32),
            "float" | "float32" => Ok(DataType::Float32),
            "double" | "float64" => Ok(DataType::Float64),
            _ => Err(ParseDataTypeError(s.to_string())),
        }
    }
}

/// A numeric type that can be stored in a raster cell.
pub trait CellValue:
    Copy + PartialEq + PartialOrd + Default + fmt::Debug + Send + Sync + 'static
{
    /// Element type reported for rasters of this cell type.
    const DATA_TYPE: DataType;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;

    fn is_nan(self) -> bool {
        false
    }

    /// Equality that treats two NaNs as the same value.
    fn same_as(self, other: Self) -> bool {
        self == other || (self.is_nan() && other.is_nan())
    }
}

macro_rules! impl_integer_cell {
    ($($t:ty => $dt:expr),* $(,)?) => {
        $(
            impl CellValue for $t {
                const DATA_TYPE: DataType = $dt;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value as $t
                }
            }
        )*
    };
}

macro_rules! impl_float_cell {
    ($($t:ty => $dt:expr),* $(,)?) => {
        $(
            impl CellValue for $t {
                const DATA_TYPE: DataType = $dt;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value as $t
                }

                #[inline]
                fn is_nan(self) -> bool {
                    <$t>::is_nan(self)
                }
            }
        )*
    };
}

impl_integer_cell! {
    u8 => DataType::UInt8,
    i8 => DataType::Int8,
    u16 => DataType::UInt16,
    i16 => DataType::Int16,
    u32 => DataType::UInt32,
    i32 => DataType::Int32,
}

impl_float_cell! {
    f32 => DataType::Float32,
    f64 => DataType::Float64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_type_names() {
        assert_eq!("uint8".parse::<DataType>().unwrap(), DataType::UInt8);
        assert_eq!("INT16".parse::<DataType>().unwrap(), DataType::Int16);
        assert_eq!("float".parse::<DataType>().unwrap(), DataType::Float32);
        assert_eq!("double".parse::<DataType>().unwrap(), DataType::Float64);
        assert!("complex".parse::<DataType>().is_err());
    }

    #[test]
    fn test_parse_optional_unknown() {
        assert_eq!(DataType::parse_optional("Unknown").unwrap(), None);
        assert_eq!(DataType::parse_optional("").unwrap(), None);
        assert_eq!(
            DataType::parse_optional("int32").unwrap(),
            Some(DataType::Int32)
        );
    }

    #[test]
    fn test_cast_saturates_integers() {
        assert_eq!(DataType::UInt8.cast(300.0), 255.0);
        assert_eq!(DataType::Int16.cast(-9999.0), -9999.0);
        assert_eq!(DataType::Int32.cast(4.7), 4.0);
    }

    #[test]
    fn test_cell_value_conversions() {
        assert_eq!(i32::from_f64(-9999.0), -9999);
        assert_eq!(u16::from_f64(300.0), 300);
        assert_eq!(f32::from_f64(2.5).to_f64(), 2.5);
        assert_eq!(<i16 as CellValue>::DATA_TYPE, DataType::Int16);
    }

    #[test]
    fn test_nodata_for_unrepresentable_values() {
        assert_eq!(DataType::Int16.nodata_for(-9999.0), -9999.0);
        assert_eq!(DataType::UInt8.nodata_for(-9999.0), 255.0);
        assert_eq!(DataType::UInt16.nodata_for(-9999.0), 65535.0);
        assert_eq!(DataType::UInt32.nodata_for(-1.0), 4294967295.0);
        assert_eq!(DataType::Int8.nodata_for(-9999.0), -128.0);
        assert_eq!(DataType::UInt8.nodata_for(0.0), 0.0);
        assert_eq!(DataType::Int32.nodata_for(2.5), f64::from(i32::MIN));
        assert_eq!(DataType::Float32.nodata_for(-9999.0), -9999.0);
        assert!(DataType::Float64.nodata_for(f64::NAN).is_nan());
        assert_eq!(DataType::UInt8.nodata_for(f64::NAN), 255.0);
    }

    #[test]
    fn test_same_as_handles_nan() {
        assert!(f64::NAN.same_as(f64::NAN));
        assert!(!1.0f64.same_as(f64::NAN));
        assert!(3i32.same_as(3));
    }
}
