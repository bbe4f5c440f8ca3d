//! In-memory columnar data model.
//!
//! A [`RowBatch`] is a set of same-length [`Column`]s. Each column stores its
//! values in a typed vector plus one presence flag per row, exported to Arrow
//! as a null buffer.

mod batch;
mod column;
mod value;

pub use batch::{Field, RowBatch, Schema};
pub use column::{Column, ColumnData};
pub use value::{DataType, OtherValue, Value};
