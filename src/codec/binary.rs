//! Binary column codec.
//!
//! Columns travel as Arrow arrays inside an Arrow IPC stream, the format
//! Feather-speaking workers read and write. Each native type maps to one
//! Arrow type:
//!
//! ```text
//! int64   Int64        double  Float64      float  Float32
//! string  Utf8         binary  Binary       bool   Boolean
//! uint8   UInt8        int8    Int8
//! ```
//!
//! Validity is the array's null buffer. Host types without a native mapping
//! cannot be sent in binary form.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Float32Array, Float64Array, Int64Array,
    Int8Array, RecordBatch, StringArray, UInt8Array,
};
use arrow::buffer::{BooleanBuffer, ScalarBuffer};
use arrow::datatypes::{
    DataType as ArrowType, Field as ArrowField, Float32Type, Float64Type, Int64Type, Int8Type,
    Schema as ArrowSchema, UInt8Type,
};

use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{Column, ColumnData, DataType, RowBatch, Value};

const FORMAT_NAME: &str = "binary";

/// Largest byte length an Arrow string or binary array can address.
const MAX_VAR_BYTES: usize = i32::MAX as usize;

/// Arrow type of a column type.
pub fn arrow_type(data_type: &DataType) -> ExchangeResult<ArrowType> {
    Ok(match data_type {
        DataType::Int64 => ArrowType::Int64,
        DataType::Float64 => ArrowType::Float64,
        DataType::Float32 => ArrowType::Float32,
        DataType::Utf8 => ArrowType::Utf8,
        DataType::Binary => ArrowType::Binary,
        DataType::Bool => ArrowType::Boolean,
        DataType::UInt8 => ArrowType::UInt8,
        DataType::Int8 => ArrowType::Int8,
        DataType::Other(_) => return Err(ExchangeError::unsupported(data_type, FORMAT_NAME)),
    })
}

/// Column type of an Arrow type. Arrow types outside the native set come
/// back as `Other` carrying Arrow's own name.
pub fn from_arrow_type(arrow: &ArrowType) -> DataType {
    match arrow {
        ArrowType::Int64 => DataType::Int64,
        ArrowType::Float64 => DataType::Float64,
        ArrowType::Float32 => DataType::Float32,
        ArrowType::Utf8 => DataType::Utf8,
        ArrowType::Binary => DataType::Binary,
        ArrowType::Boolean => DataType::Bool,
        ArrowType::UInt8 => DataType::UInt8,
        ArrowType::Int8 => DataType::Int8,
        other => DataType::Other(other.to_string()),
    }
}

/// Fails if `data_type` has no binary mapping.
pub fn check_binary_type(data_type: &DataType) -> ExchangeResult<()> {
    arrow_type(data_type).map(|_| ())
}

/// Convert a column into an Arrow array.
pub fn encode_binary_column(column: &Column) -> ExchangeResult<ArrayRef> {
    let nulls = column.nulls();
    let valid = |i: usize| !column.is_null(i);
    let array: ArrayRef = match column.data() {
        ColumnData::Int64(v) => Arc::new(Int64Array::new(ScalarBuffer::from(v.clone()), nulls)),
        ColumnData::Float64(v) => {
            Arc::new(Float64Array::new(ScalarBuffer::from(v.clone()), nulls))
        }
        ColumnData::Float32(v) => {
            Arc::new(Float32Array::new(ScalarBuffer::from(v.clone()), nulls))
        }
        ColumnData::UInt8(v) => Arc::new(UInt8Array::new(ScalarBuffer::from(v.clone()), nulls)),
        ColumnData::Int8(v) => Arc::new(Int8Array::new(ScalarBuffer::from(v.clone()), nulls)),
        ColumnData::Bool(v) => Arc::new(BooleanArray::new(BooleanBuffer::from(v.as_slice()), nulls)),
        ColumnData::Utf8(v) => {
            check_var_bytes(column.name(), v.iter().map(String::len))?;
            Arc::new(
                v.iter()
                    .enumerate()
                    .map(|(i, s)| valid(i).then_some(s.as_str()))
                    .collect::<StringArray>(),
            )
        }
        ColumnData::Binary(v) => {
            check_var_bytes(column.name(), v.iter().map(Vec::len))?;
            Arc::new(
                v.iter()
                    .enumerate()
                    .map(|(i, b)| valid(i).then_some(b.as_slice()))
                    .collect::<BinaryArray>(),
            )
        }
        ColumnData::Other(name, _) => {
            return Err(ExchangeError::unsupported(
                &DataType::Other(name.clone()),
                FORMAT_NAME,
            ))
        }
    };
    Ok(array)
}

fn check_var_bytes(name: &str, lengths: impl Iterator<Item = usize>) -> ExchangeResult<()> {
    let total: usize = lengths.sum();
    if total > MAX_VAR_BYTES {
        return Err(ExchangeError::CorruptPayload(format!(
            "column '{}' holds {} bytes, more than an Arrow array can address",
            name, total
        )));
    }
    Ok(())
}

/// Convert a batch into an Arrow record batch with nullable fields.
pub fn to_record_batch(batch: &RowBatch) -> ExchangeResult<RecordBatch> {
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut arrays = Vec::with_capacity(batch.num_columns());
    for column in batch.columns() {
        fields.push(ArrowField::new(
            column.name(),
            arrow_type(&column.data_type())?,
            true,
        ));
        arrays.push(encode_binary_column(column)?);
    }
    RecordBatch::try_new(Arc::new(ArrowSchema::new(fields)), arrays)
        .map_err(|e| ExchangeError::CorruptPayload(e.to_string()))
}

/// Decode an Arrow array into a column named `name` of type `declared`.
pub fn decode_binary_column(
    name: &str,
    array: &dyn Array,
    declared: &DataType,
) -> ExchangeResult<Column> {
    let mut column = Column::new(name, declared);
    append_binary_column(&mut column, array)?;
    Ok(column)
}

/// Append the rows of an Arrow array to `column`.
///
/// The array's type must be the Arrow type of the column's type.
pub fn append_binary_column(column: &mut Column, array: &dyn Array) -> ExchangeResult<()> {
    let declared = column.data_type();
    let mismatch = || {
        ExchangeError::CorruptPayload(format!(
            "column '{}': expected {} values, found {}",
            column.name(),
            declared,
            array.data_type()
        ))
    };
    let rows = array.len();
    match &declared {
        DataType::Int64 => {
            let a = array.as_primitive_opt::<Int64Type>().ok_or_else(mismatch)?;
            push_rows(column, rows, |i| a.is_valid(i).then(|| Value::Int64(a.value(i))))
        }
        DataType::Float64 => {
            let a = array.as_primitive_opt::<Float64Type>().ok_or_else(mismatch)?;
            push_rows(column, rows, |i| a.is_valid(i).then(|| Value::Float64(a.value(i))))
        }
        DataType::Float32 => {
            let a = array.as_primitive_opt::<Float32Type>().ok_or_else(mismatch)?;
            push_rows(column, rows, |i| a.is_valid(i).then(|| Value::Float32(a.value(i))))
        }
        DataType::UInt8 => {
            let a = array.as_primitive_opt::<UInt8Type>().ok_or_else(mismatch)?;
            push_rows(column, rows, |i| a.is_valid(i).then(|| Value::UInt8(a.value(i))))
        }
        DataType::Int8 => {
            let a = array.as_primitive_opt::<Int8Type>().ok_or_else(mismatch)?;
            push_rows(column, rows, |i| a.is_valid(i).then(|| Value::Int8(a.value(i))))
        }
        DataType::Bool => {
            let a = array.as_boolean_opt().ok_or_else(mismatch)?;
            push_rows(column, rows, |i| a.is_valid(i).then(|| Value::Bool(a.value(i))))
        }
        DataType::Utf8 => {
            let a = array.as_string_opt::<i32>().ok_or_else(mismatch)?;
            push_rows(column, rows, |i| {
                a.is_valid(i).then(|| Value::Utf8(a.value(i).to_string()))
            })
        }
        DataType::Binary => {
            let a = array.as_binary_opt::<i32>().ok_or_else(mismatch)?;
            push_rows(column, rows, |i| {
                a.is_valid(i).then(|| Value::Binary(a.value(i).to_vec()))
            })
        }
        DataType::Other(_) => Err(ExchangeError::unsupported(&declared, FORMAT_NAME)),
    }
}

fn push_rows(
    column: &mut Column,
    rows: usize,
    value: impl Fn(usize) -> Option<Value>,
) -> ExchangeResult<()> {
    for i in 0..rows {
        match value(i) {
            Some(v) => column.push(v)?,
            None => column.push_null(),
        }
    }
    Ok(())
}
