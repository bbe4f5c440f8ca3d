//! Error taxonomy for the exchange engine.
//!
//! Every failure the engine can surface belongs to exactly one [`ErrorClass`].
//! None of them are retried inside the crate: a failed stream stops, the
//! worker is terminated, and whatever was already decoded is kept.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::DataType;

/// Result type for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Coarse classification reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The worker process could not be created.
    Spawn,
    /// A pipe read or write could not complete at all.
    Io,
    /// Malformed header, count or type mismatch, short read.
    Protocol,
    /// A single cell could not be parsed under its declared type.
    Format,
    /// An attribute type has no mapping in the requested wire format.
    UnsupportedType,
}

/// Errors that can occur while exchanging rows with a worker.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Failed to spawn the worker process.
    #[error("failed to spawn worker process '{}': {source}", command.display())]
    SpawnFailed {
        command: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to worker stdin.
    #[error("failed to write to worker: {0}")]
    WriteFailed(#[source] io::Error),

    /// Failed to read from worker stdout.
    #[error("failed to read from worker: {0}")]
    ReadFailed(#[source] io::Error),

    /// The host sink could not store output.
    #[error("failed to write output: {0}")]
    SinkFailed(#[source] io::Error),

    /// Worker closed its output at a frame boundary when a reply was required.
    #[error("worker process exited unexpectedly")]
    WorkerExited,

    /// I/O was attempted on a worker already marked dead.
    #[error("worker is no longer alive")]
    WorkerDead,

    /// No reply arrived within the configured receive timeout.
    #[error("no reply from worker within {0:?}")]
    Timeout(Duration),

    /// Frame header could not be parsed.
    #[error("malformed frame header: {0}")]
    MalformedHeader(String),

    /// Reply carries a different number of columns than expected.
    #[error("expected {expected} columns, worker replied with {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    /// Reply column has a different type than declared.
    #[error("column {column}: expected type {expected}, got {actual}")]
    ColumnTypeMismatch {
        column: usize,
        expected: DataType,
        actual: DataType,
    },

    /// A value's tag does not match its column's declared type.
    #[error("column '{column}': value of type {actual} does not fit declared type {expected}")]
    ValueTypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    /// A column or frame holds a different number of rows than announced.
    #[error("column {column}: expected {expected} rows, found {actual}")]
    RowCountMismatch {
        column: usize,
        expected: usize,
        actual: usize,
    },

    /// Text reply announced a different number of rows than it carried.
    #[error("reply announced {expected} rows but carried {actual}")]
    LineCountMismatch { expected: usize, actual: usize },

    /// Pipe closed before a full frame was read.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// Declared frame length exceeds the configured limit.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: u64, limit: u64 },

    /// Tried to encode a batch with no columns.
    #[error("cannot encode a batch with zero columns")]
    EmptySchema,

    /// Row count does not fit the wire format's 32-bit signed row field.
    #[error("batch of {0} rows exceeds the wire format row limit")]
    RowCountOverflow(usize),

    /// Binary payload structure is inconsistent.
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    /// A text cell could not be parsed or rendered.
    #[error("row {row}, column {column}: invalid {data_type} cell {text:?}: {reason}")]
    InvalidCell {
        row: usize,
        column: usize,
        text: String,
        data_type: DataType,
        reason: String,
    },

    /// Type has no mapping in the given wire format.
    #[error("type {data_type} is not supported by the {format} format")]
    UnsupportedType {
        data_type: DataType,
        format: &'static str,
    },
}

impl ExchangeError {
    /// Build a cell parse error.
    pub fn invalid_cell(
        row: usize,
        column: usize,
        text: impl Into<String>,
        data_type: &DataType,
        reason: impl ToString,
    ) -> Self {
        Self::InvalidCell {
            row,
            column,
            text: text.into(),
            data_type: data_type.clone(),
            reason: reason.to_string(),
        }
    }

    /// Relocate a cell error to its position in the batch.
    pub fn at_cell(self, row: usize, column: usize) -> Self {
        match self {
            Self::InvalidCell {
                text,
                data_type,
                reason,
                ..
            } => Self::InvalidCell {
                row,
                column,
                text,
                data_type,
                reason,
            },
            other => other,
        }
    }

    /// Build an unsupported type error.
    pub fn unsupported(data_type: &DataType, format: &'static str) -> Self {
        Self::UnsupportedType {
            data_type: data_type.clone(),
            format,
        }
    }

    /// The class this error is reported under.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::SpawnFailed { .. } => ErrorClass::Spawn,
            Self::WriteFailed(_)
            | Self::ReadFailed(_)
            | Self::WorkerExited
            | Self::WorkerDead
            | Self::Timeout(_)
            | Self::SinkFailed(_) => ErrorClass::Io,
            Self::MalformedHeader(_)
            | Self::ColumnCountMismatch { .. }
            | Self::ColumnTypeMismatch { .. }
            | Self::ValueTypeMismatch { .. }
            | Self::RowCountMismatch { .. }
            | Self::LineCountMismatch { .. }
            | Self::ShortRead { .. }
            | Self::FrameTooLarge { .. }
            | Self::EmptySchema
            | Self::RowCountOverflow(_)
            | Self::CorruptPayload(_) => ErrorClass::Protocol,
            Self::InvalidCell { .. } => ErrorClass::Format,
            Self::UnsupportedType { .. } => ErrorClass::UnsupportedType,
        }
    }

    /// Check if this error ends the stream it occurred in.
    ///
    /// Only a spawn failure happens before there is a stream to end.
    pub fn is_worker_fatal(&self) -> bool {
        !matches!(self, Self::SpawnFailed { .. })
    }

    /// Check if this error indicates the worker has gone away.
    pub fn is_worker_exited(&self) -> bool {
        matches!(
            self,
            Self::WorkerExited | Self::WorkerDead | Self::WriteFailed(_) | Self::ReadFailed(_)
        )
    }
}
