//! Schemas and row batches.

use super::column::Column;
use super::value::{DataType, Value};
use crate::error::{ExchangeError, ExchangeResult};

/// Name and declared type of one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered attribute list of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Build a schema from types alone, naming attributes `a0`, `a1`, ...
    pub fn from_types(types: &[DataType]) -> Self {
        Self::new(
            types
                .iter()
                .enumerate()
                .map(|(i, t)| Field::new(format!("a{}", i), t.clone()))
                .collect(),
        )
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &DataType> {
        self.fields.iter().map(|f| &f.data_type)
    }
}

/// Same-length columns plus their shared row count.
///
/// A batch with zero rows is a legitimate value and distinct from "no reply".
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    columns: Vec<Column>,
    num_rows: usize,
}

impl RowBatch {
    /// Assemble a batch, checking that all columns have the same length.
    pub fn try_new(columns: Vec<Column>) -> ExchangeResult<Self> {
        let num_rows = columns.first().map(Column::len).unwrap_or(0);
        for (i, column) in columns.iter().enumerate() {
            if column.len() != num_rows {
                return Err(ExchangeError::RowCountMismatch {
                    column: i,
                    expected: num_rows,
                    actual: column.len(),
                });
            }
        }
        Ok(Self { columns, num_rows })
    }

    /// An empty batch with the columns of `schema`.
    pub fn empty(schema: &Schema) -> Self {
        Self {
            columns: schema
                .fields()
                .iter()
                .map(|f| Column::new(f.name.clone(), &f.data_type))
                .collect(),
            num_rows: 0,
        }
    }

    /// Build a batch row by row.
    pub fn from_rows(schema: &Schema, rows: Vec<Vec<Value>>) -> ExchangeResult<Self> {
        let mut columns: Vec<Column> = schema
            .fields()
            .iter()
            .map(|f| Column::new(f.name.clone(), &f.data_type))
            .collect();
        for row in rows {
            if row.len() != columns.len() {
                return Err(ExchangeError::ColumnCountMismatch {
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value)?;
            }
        }
        Self::try_new(columns)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Schema derived from the columns.
    pub fn schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| Field::new(c.name(), c.data_type()))
                .collect(),
        )
    }

    /// Values of one row in column order.
    pub fn row(&self, index: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.value(index)).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.num_rows).map(|i| self.row(i))
    }
}
