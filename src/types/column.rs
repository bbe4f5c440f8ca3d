//! Typed, nullable columns.

use arrow::buffer::NullBuffer;

use super::value::{DataType, OtherValue, Value};
use crate::error::{ExchangeError, ExchangeResult};

/// Typed storage of a column. Slots of null rows hold the type's default.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Float32(Vec<f32>),
    Utf8(Vec<String>),
    Binary(Vec<Vec<u8>>),
    Bool(Vec<bool>),
    UInt8(Vec<u8>),
    Int8(Vec<i8>),
    Other(String, Vec<OtherValue>),
}

impl ColumnData {
    pub fn new(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int64 => Self::Int64(Vec::new()),
            DataType::Float64 => Self::Float64(Vec::new()),
            DataType::Float32 => Self::Float32(Vec::new()),
            DataType::Utf8 => Self::Utf8(Vec::new()),
            DataType::Binary => Self::Binary(Vec::new()),
            DataType::Bool => Self::Bool(Vec::new()),
            DataType::UInt8 => Self::UInt8(Vec::new()),
            DataType::Int8 => Self::Int8(Vec::new()),
            DataType::Other(name) => Self::Other(name.clone(), Vec::new()),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
            Self::Float32(_) => DataType::Float32,
            Self::Utf8(_) => DataType::Utf8,
            Self::Binary(_) => DataType::Binary,
            Self::Bool(_) => DataType::Bool,
            Self::UInt8(_) => DataType::UInt8,
            Self::Int8(_) => DataType::Int8,
            Self::Other(name, _) => DataType::Other(name.clone()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Utf8(v) => v.len(),
            Self::Binary(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::Other(_, v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a placeholder for a null row.
    fn push_default(&mut self) {
        match self {
            Self::Int64(v) => v.push(0),
            Self::Float64(v) => v.push(0.0),
            Self::Float32(v) => v.push(0.0),
            Self::Utf8(v) => v.push(String::new()),
            Self::Binary(v) => v.push(Vec::new()),
            Self::Bool(v) => v.push(false),
            Self::UInt8(v) => v.push(0),
            Self::Int8(v) => v.push(0),
            Self::Other(name, v) => v.push(OtherValue::new(name.clone(), Vec::new())),
        }
    }

    /// Append a non-null value. Returns it back if the tag does not match.
    fn push_value(&mut self, value: Value) -> Result<(), Value> {
        match (self, value) {
            (Self::Int64(v), Value::Int64(x)) => v.push(x),
            (Self::Float64(v), Value::Float64(x)) => v.push(x),
            (Self::Float32(v), Value::Float32(x)) => v.push(x),
            (Self::Utf8(v), Value::Utf8(x)) => v.push(x),
            (Self::Binary(v), Value::Binary(x)) => v.push(x),
            (Self::Bool(v), Value::Bool(x)) => v.push(x),
            (Self::UInt8(v), Value::UInt8(x)) => v.push(x),
            (Self::Int8(v), Value::Int8(x)) => v.push(x),
            (Self::Other(name, v), Value::Other(x)) if *name == x.type_name => v.push(x),
            (_, value) => return Err(value),
        }
        Ok(())
    }

    fn value(&self, index: usize) -> Value {
        match self {
            Self::Int64(v) => Value::Int64(v[index]),
            Self::Float64(v) => Value::Float64(v[index]),
            Self::Float32(v) => Value::Float32(v[index]),
            Self::Utf8(v) => Value::Utf8(v[index].clone()),
            Self::Binary(v) => Value::Binary(v[index].clone()),
            Self::Bool(v) => Value::Bool(v[index]),
            Self::UInt8(v) => Value::UInt8(v[index]),
            Self::Int8(v) => Value::Int8(v[index]),
            Self::Other(_, v) => Value::Other(v[index].clone()),
        }
    }
}

/// A named column with one presence flag per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
    validity: Vec<bool>,
}

impl Column {
    /// Create an empty column.
    pub fn new(name: impl Into<String>, data_type: &DataType) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::new(data_type),
            validity: Vec::new(),
        }
    }

    /// Build a column from a sequence of values.
    pub fn from_values(
        name: impl Into<String>,
        data_type: &DataType,
        values: impl IntoIterator<Item = Value>,
    ) -> ExchangeResult<Self> {
        let mut column = Self::new(name, data_type);
        for value in values {
            column.push(value)?;
        }
        Ok(column)
    }

    /// Append a value. Its tag must match the column's type.
    pub fn push(&mut self, value: Value) -> ExchangeResult<()> {
        if value.is_null() {
            self.data.push_default();
            self.validity.push(false);
            return Ok(());
        }
        match self.data.push_value(value) {
            Ok(()) => {
                self.validity.push(true);
                Ok(())
            }
            Err(value) => Err(ExchangeError::ValueTypeMismatch {
                column: self.name.clone(),
                expected: self.data.data_type(),
                actual: value.data_type().unwrap_or(DataType::Utf8),
            }),
        }
    }

    pub fn push_null(&mut self) {
        self.data.push_default();
        self.validity.push(false);
    }

    /// Value at `index`, `Value::Null` for a null row.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn value(&self, index: usize) -> Value {
        if self.validity[index] {
            self.data.value(index)
        } else {
            Value::Null
        }
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(|i| self.value(i))
    }

    pub fn is_null(&self, index: usize) -> bool {
        !self.validity.get(index).copied().unwrap_or(false)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Validity as an Arrow null buffer, `None` when no row is null.
    pub fn nulls(&self) -> Option<NullBuffer> {
        if self.null_count() == 0 {
            None
        } else {
            Some(NullBuffer::from(self.validity.as_slice()))
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.validity.iter().filter(|valid| !**valid).count()
    }
}
