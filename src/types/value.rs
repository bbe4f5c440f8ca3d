//! Scalar types and values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declared type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    Int64,
    Float64,
    Float32,
    Utf8,
    Binary,
    Bool,
    UInt8,
    Int8,
    /// A host type with no native wire mapping, rendered through a stringifier.
    Other(String),
}

impl DataType {
    /// Canonical name used in configuration and on the command line.
    pub fn name(&self) -> &str {
        match self {
            Self::Int64 => "int64",
            Self::Float64 => "double",
            Self::Float32 => "float",
            Self::Utf8 => "string",
            Self::Binary => "binary",
            Self::Bool => "bool",
            Self::UInt8 => "uint8",
            Self::Int8 => "int8",
            Self::Other(name) => name,
        }
    }

    /// Parse a type name. Unknown names become [`DataType::Other`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "int64" => Self::Int64,
            "double" | "float64" => Self::Float64,
            "float" | "float32" => Self::Float32,
            "string" | "utf8" => Self::Utf8,
            "binary" => Self::Binary,
            "bool" => Self::Bool,
            "uint8" => Self::UInt8,
            "int8" => Self::Int8,
            _ => Self::Other(name.trim().to_string()),
        }
    }

    /// Parse a comma-separated list of type names.
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn is_native(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl TryFrom<String> for DataType {
    type Error = std::convert::Infallible;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Ok(Self::parse(&s))
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        data_type.name().to_string()
    }
}

/// Opaque value of a non-native host type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OtherValue {
    pub type_name: String,
    pub bytes: Vec<u8>,
}

impl OtherValue {
    pub fn new(type_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            type_name: type_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// A single, possibly null, typed cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int64(i64),
    Float64(f64),
    Float32(f32),
    Utf8(String),
    Binary(Vec<u8>),
    Bool(bool),
    UInt8(u8),
    Int8(i8),
    Other(OtherValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Type tag of a non-null value.
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            Self::Null => return None,
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
            Self::Float32(_) => DataType::Float32,
            Self::Utf8(_) => DataType::Utf8,
            Self::Binary(_) => DataType::Binary,
            Self::Bool(_) => DataType::Bool,
            Self::UInt8(_) => DataType::UInt8,
            Self::Int8(_) => DataType::Int8,
            Self::Other(v) => DataType::Other(v.type_name.clone()),
        })
    }

    /// Whether this value may live in a column of `data_type`.
    pub fn fits(&self, data_type: &DataType) -> bool {
        match self.data_type() {
            None => true,
            Some(own) => &own == data_type,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Utf8(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Utf8(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}
