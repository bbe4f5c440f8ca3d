//! Row batch encoder.

use arrow::array::Array;
use tracing::debug;

use super::frame::{write_payload, Frame, WireFormat, MAX_WIRE_ROWS};
use crate::codec::binary::check_binary_type;
use crate::codec::{to_record_batch, TextCodec};
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{RowBatch, Schema};

/// Serializes input batches into request frames.
///
/// The encoder is bound to the input schema at construction; every type in
/// it must be representable in the chosen format.
#[derive(Debug, Clone)]
pub struct BatchEncoder {
    format: WireFormat,
    schema: Schema,
    text: TextCodec,
}

impl BatchEncoder {
    pub fn new(format: WireFormat, schema: Schema, text: TextCodec) -> ExchangeResult<Self> {
        if schema.is_empty() {
            return Err(ExchangeError::EmptySchema);
        }
        for data_type in schema.types() {
            match format {
                WireFormat::Text => text.check_encodable(data_type)?,
                WireFormat::Binary => check_binary_type(data_type)?,
            }
        }
        Ok(Self {
            format,
            schema,
            text,
        })
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Encode one batch into a request frame.
    pub fn encode(&self, batch: &RowBatch) -> ExchangeResult<Frame> {
        self.check_batch(batch)?;
        match self.format {
            WireFormat::Text => self.encode_text(batch),
            WireFormat::Binary => self.encode_binary(batch),
        }
    }

    fn check_batch(&self, batch: &RowBatch) -> ExchangeResult<()> {
        if batch.num_columns() == 0 {
            return Err(ExchangeError::EmptySchema);
        }
        if batch.num_columns() != self.schema.len() {
            return Err(ExchangeError::ColumnCountMismatch {
                expected: self.schema.len(),
                actual: batch.num_columns(),
            });
        }
        for (i, (column, expected)) in batch.columns().iter().zip(self.schema.types()).enumerate() {
            let actual = column.data_type();
            if &actual != expected {
                return Err(ExchangeError::ColumnTypeMismatch {
                    column: i,
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    fn encode_text(&self, batch: &RowBatch) -> ExchangeResult<Frame> {
        let options = self.text.options();
        let mut out = String::new();
        for row in 0..batch.num_rows() {
            for (i, column) in batch.columns().iter().enumerate() {
                if i > 0 {
                    out.push(options.attribute_delimiter);
                }
                self.text
                    .encode_cell(&column.value(row), &mut out)
                    .map_err(|e| e.at_cell(row, i))?;
            }
            out.push(options.line_delimiter);
        }
        debug!(rows = batch.num_rows(), bytes = out.len(), "encoded text batch");
        Ok(Frame::Text {
            row_count: batch.num_rows(),
            body: out.into_bytes(),
        })
    }

    fn encode_binary(&self, batch: &RowBatch) -> ExchangeResult<Frame> {
        if batch.num_rows() > MAX_WIRE_ROWS {
            return Err(ExchangeError::RowCountOverflow(batch.num_rows()));
        }
        let record = to_record_batch(batch)?;
        for (column, array) in batch.columns().iter().zip(record.columns()) {
            debug!(
                column = column.name(),
                nulls = array.null_count(),
                "encoded binary column"
            );
        }
        let payload = write_payload(&record.schema(), &[record])?;
        debug!(
            rows = batch.num_rows(),
            columns = batch.num_columns(),
            bytes = payload.len(),
            "encoded binary batch"
        );
        Ok(Frame::Binary { payload })
    }
}
