//! Frames and the binary payload layout.
//!
//! # Text frames
//!
//! ```text
//! <row count>\n
//! <cell>\t<cell>\t...\n      (row count lines)
//! ```
//!
//! A row count of `0` with no lines is the end-of-stream marker.
//!
//! # Binary frames
//!
//! An 8-byte little-endian length followed by that many payload bytes. A
//! length of `0` is the end-of-stream marker. The payload is an Arrow IPC
//! stream: one schema message, then record batch messages. Arrays are
//! addressed with 32-bit offsets, so a payload carries at most `i32::MAX`
//! rows.
//!
//! A payload whose schema has zero fields is legal and means "no rows this
//! round".

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::{Schema as ArrowSchema, SchemaRef};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use serde::{Deserialize, Serialize};

use crate::error::{ExchangeError, ExchangeResult};
use crate::types::RowBatch;

/// Marker opening every message of an Arrow IPC stream.
const IPC_CONTINUATION: [u8; 4] = [0xff; 4];

/// Size of the binary frame length prefix.
pub const LENGTH_PREFIX_BYTES: usize = 8;

/// Largest row count one binary payload can carry.
pub const MAX_WIRE_ROWS: usize = i32::MAX as usize;

/// The two wire encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    Text,
    Binary,
}

impl WireFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "tsv" => Ok(Self::Text),
            "binary" | "feather" => Ok(Self::Binary),
            other => Err(format!("unknown wire format: {}", other)),
        }
    }
}

/// One unit exchanged in one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `row_count` rows of text; `body` holds exactly those lines, each
    /// terminated by the line delimiter.
    Text { row_count: usize, body: Vec<u8> },
    /// A non-empty binary payload, without its length prefix.
    Binary { payload: Vec<u8> },
    /// The end-of-stream marker of either format.
    End,
}

impl Frame {
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

/// What a decoded reply means for the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Rows to append to the output.
    Batch(RowBatch),
    /// No rows this round; the stream continues.
    Empty,
    /// The worker closed the stream.
    EndOfStream,
}

/// Parse a text header line (without its delimiter) into a row count.
pub fn parse_row_count(line: &str) -> ExchangeResult<usize> {
    if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ExchangeError::MalformedHeader(format!(
            "expected a decimal row count, got {:?}",
            line
        )));
    }
    line.parse::<usize>()
        .map_err(|e| ExchangeError::MalformedHeader(format!("row count {:?}: {}", line, e)))
}

/// A parsed binary payload.
#[derive(Debug, Clone)]
pub struct Payload {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl Payload {
    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }
}

/// Serialize record batches into an Arrow IPC stream payload.
pub fn write_payload(schema: &SchemaRef, batches: &[RecordBatch]) -> ExchangeResult<Vec<u8>> {
    let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    if rows > MAX_WIRE_ROWS {
        return Err(ExchangeError::RowCountOverflow(rows));
    }
    let corrupt = |e: arrow::error::ArrowError| ExchangeError::CorruptPayload(e.to_string());
    let mut out = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut out, schema.as_ref()).map_err(corrupt)?;
        for batch in batches {
            writer.write(batch).map_err(corrupt)?;
        }
        writer.finish().map_err(corrupt)?;
    }
    Ok(out)
}

/// A payload with zero columns, meaning "no rows this round".
pub fn empty_payload() -> ExchangeResult<Vec<u8>> {
    write_payload(&Arc::new(ArrowSchema::empty()), &[])
}

/// Parse a binary payload without checking it against a schema.
///
/// Bytes that do not open an IPC stream are a `MalformedHeader`; a stream
/// that breaks off or fails Arrow's validation is a `CorruptPayload`.
pub fn parse_payload(bytes: &[u8]) -> ExchangeResult<Payload> {
    check_stream_header(bytes)?;
    let reader = StreamReader::try_new(Cursor::new(bytes), None).map_err(|e| {
        ExchangeError::MalformedHeader(format!("unreadable Arrow IPC schema: {}", e))
    })?;
    let schema = reader.schema();
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ExchangeError::CorruptPayload(e.to_string()))?;
    let payload = Payload { schema, batches };
    if payload.num_rows() > MAX_WIRE_ROWS {
        return Err(ExchangeError::RowCountOverflow(payload.num_rows()));
    }
    Ok(payload)
}

/// Check the first message prefix before Arrow sizes any buffer from it.
fn check_stream_header(bytes: &[u8]) -> ExchangeResult<()> {
    let Some(prefix) = bytes.get(..8) else {
        return Err(ExchangeError::MalformedHeader(format!(
            "payload of {} bytes is too short for an Arrow IPC stream",
            bytes.len()
        )));
    };
    if prefix[..4] != IPC_CONTINUATION {
        return Err(ExchangeError::MalformedHeader(
            "payload is not an Arrow IPC stream".to_string(),
        ));
    }
    let metadata_len = i32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    let available = bytes.len() - prefix.len();
    if metadata_len <= 0 || metadata_len as usize > available {
        return Err(ExchangeError::MalformedHeader(format!(
            "schema message of {} bytes in a payload with {} bytes left",
            metadata_len, available
        )));
    }
    Ok(())
}

/// Encode a batch into a binary payload.
pub fn batch_payload(batch: &RowBatch) -> ExchangeResult<Vec<u8>> {
    let record = crate::codec::to_record_batch(batch)?;
    write_payload(&record.schema(), &[record])
}
