//! Row batch decoder.

use tracing::debug;

use super::frame::{parse_payload, parse_row_count, Frame, Reply, WireFormat};
use crate::codec::binary::{append_binary_column, check_binary_type, from_arrow_type};
use crate::codec::TextCodec;
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{Column, RowBatch, Schema};

/// Parses reply frames into typed batches of the declared output schema.
#[derive(Debug, Clone)]
pub struct BatchDecoder {
    format: WireFormat,
    schema: Schema,
    text: TextCodec,
}

impl BatchDecoder {
    pub fn new(format: WireFormat, schema: Schema, text: TextCodec) -> ExchangeResult<Self> {
        if schema.is_empty() {
            return Err(ExchangeError::EmptySchema);
        }
        for data_type in schema.types() {
            match format {
                WireFormat::Text => text.check_decodable(data_type)?,
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

    /// Decode a reply frame.
    pub fn decode(&self, frame: &Frame) -> ExchangeResult<Reply> {
        match frame {
            Frame::End => Ok(Reply::EndOfStream),
            Frame::Text { row_count, body } => self.decode_text_rows(*row_count, body),
            Frame::Binary { payload } => self.decode_binary(payload),
        }
    }

    /// Decode a complete text message, header line included.
    pub fn decode_text_message(&self, message: &[u8]) -> ExchangeResult<Reply> {
        let text = std::str::from_utf8(message)
            .map_err(|e| ExchangeError::CorruptPayload(format!("reply is not UTF-8: {}", e)))?;
        let delimiter = self.text.options().line_delimiter;
        let (header, body) = text.split_once(delimiter).ok_or_else(|| {
            ExchangeError::MalformedHeader("missing row count line".to_string())
        })?;
        let row_count = parse_row_count(header)?;
        self.decode_text_rows(row_count, body.as_bytes())
    }

    fn decode_text_rows(&self, row_count: usize, body: &[u8]) -> ExchangeResult<Reply> {
        let options = self.text.options();
        let text = std::str::from_utf8(body)
            .map_err(|e| ExchangeError::CorruptPayload(format!("reply is not UTF-8: {}", e)))?;
        let lines: Vec<&str> = text.split_terminator(options.line_delimiter).collect();
        if lines.len() != row_count {
            return Err(ExchangeError::LineCountMismatch {
                expected: row_count,
                actual: lines.len(),
            });
        }
        if row_count == 0 {
            return Ok(Reply::Empty);
        }

        let mut columns = self.empty_columns();
        for (row, line) in lines.iter().enumerate() {
            let cells = self.text.split_row(line);
            if cells.len() != columns.len() {
                return Err(ExchangeError::ColumnCountMismatch {
                    expected: columns.len(),
                    actual: cells.len(),
                });
            }
            for (col, (column, cell)) in columns.iter_mut().zip(cells).enumerate() {
                let value = self
                    .text
                    .decode_text(cell, &column.data_type())
                    .map_err(|e| e.at_cell(row, col))?;
                column.push(value)?;
            }
        }
        debug!(rows = row_count, "decoded text reply");
        RowBatch::try_new(columns).map(Reply::Batch)
    }

    fn decode_binary(&self, payload: &[u8]) -> ExchangeResult<Reply> {
        let parsed = parse_payload(payload)?;
        debug!(
            columns = parsed.num_columns(),
            rows = parsed.num_rows(),
            batches = parsed.batches.len(),
            "decoding binary reply"
        );
        if parsed.num_columns() == 0 {
            return Ok(Reply::Empty);
        }
        if parsed.num_columns() != self.schema.len() {
            return Err(ExchangeError::ColumnCountMismatch {
                expected: self.schema.len(),
                actual: parsed.num_columns(),
            });
        }
        for (i, (field, declared)) in parsed
            .schema
            .fields()
            .iter()
            .zip(self.schema.fields())
            .enumerate()
        {
            let actual = from_arrow_type(field.data_type());
            if actual != declared.data_type {
                return Err(ExchangeError::ColumnTypeMismatch {
                    column: i,
                    expected: declared.data_type.clone(),
                    actual,
                });
            }
        }
        if parsed.num_rows() == 0 {
            return Ok(Reply::Empty);
        }

        let mut columns = self.empty_columns();
        for batch in &parsed.batches {
            for (column, array) in columns.iter_mut().zip(batch.columns()) {
                append_binary_column(column, array.as_ref())?;
            }
        }
        for column in &columns {
            debug!(
                column = column.name(),
                nulls = column.null_count(),
                "decoded binary column"
            );
        }
        RowBatch::try_new(columns).map(Reply::Batch)
    }

    fn empty_columns(&self) -> Vec<Column> {
        self.schema
            .fields()
            .iter()
            .map(|f| Column::new(f.name.clone(), &f.data_type))
            .collect()
    }
}
