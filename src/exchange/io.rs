//! Row source and sink abstractions.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ExchangeResult;
use crate::types::{RowBatch, Schema, Value};

/// Position of an appended reply in the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutputCursor {
    /// Index of the reply among those appended so far.
    pub chunk: u64,
    /// Output row number of the reply's first row.
    pub row: u64,
}

impl OutputCursor {
    /// The cursor after appending `rows` rows at this position.
    pub fn advance(self, rows: usize) -> Self {
        Self {
            chunk: self.chunk + 1,
            row: self.row + rows as u64,
        }
    }
}

/// Yields input batches one chunk at a time.
#[async_trait]
pub trait RowSource: Send {
    /// Schema every yielded batch conforms to.
    fn schema(&self) -> &Schema;

    /// The next batch, or `None` once the input is exhausted.
    async fn next_batch(&mut self) -> ExchangeResult<Option<RowBatch>>;
}

/// Receives decoded output batches.
#[async_trait]
pub trait RowSink: Send {
    async fn append(&mut self, batch: RowBatch, cursor: OutputCursor) -> ExchangeResult<()>;

    /// Called once after the exchange reaches its final state, whether it
    /// completed or aborted.
    async fn finish(&mut self) -> ExchangeResult<()> {
        Ok(())
    }
}

/// A source over batches already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    schema: Schema,
    batches: std::collections::VecDeque<RowBatch>,
}

impl MemorySource {
    pub fn new(schema: Schema, batches: Vec<RowBatch>) -> Self {
        Self {
            schema,
            batches: batches.into(),
        }
    }

    /// Split `rows` into batches of at most `chunk_size` rows.
    pub fn from_rows(
        schema: Schema,
        rows: Vec<Vec<Value>>,
        chunk_size: usize,
    ) -> ExchangeResult<Self> {
        let chunk_size = chunk_size.max(1);
        let mut batches = Vec::with_capacity(rows.len().div_ceil(chunk_size));
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<Vec<Value>> = rows.by_ref().take(chunk_size).collect();
            batches.push(RowBatch::from_rows(&schema, chunk)?);
        }
        Ok(Self::new(schema, batches))
    }

    /// Batches not yet yielded.
    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

#[async_trait]
impl RowSource for MemorySource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn next_batch(&mut self) -> ExchangeResult<Option<RowBatch>> {
        Ok(self.batches.pop_front())
    }
}

/// A sink that keeps every appended batch with its cursor.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Vec<(OutputCursor, RowBatch)>,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> &[(OutputCursor, RowBatch)] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<RowBatch> {
        self.batches.into_iter().map(|(_, batch)| batch).collect()
    }

    /// All appended rows in output order.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        self.batches
            .iter()
            .flat_map(|(_, batch)| batch.rows())
            .collect()
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|(_, b)| b.num_rows()).sum()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[async_trait]
impl RowSink for MemorySink {
    async fn append(&mut self, batch: RowBatch, cursor: OutputCursor) -> ExchangeResult<()> {
        self.batches.push((cursor, batch));
        Ok(())
    }

    async fn finish(&mut self) -> ExchangeResult<()> {
        self.finished = true;
        Ok(())
    }
}
