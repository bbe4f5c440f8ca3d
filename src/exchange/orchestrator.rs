//! Exchange state machine.
//!
//! ```text
//! READY ──► STREAMING ──► DRAINING ──► DONE
//!               │                       ▲
//!               └──────► ABORTED ───────┘
//! ```
//!
//! Each input batch is encoded, sent, and answered by exactly one reply
//! before the next batch is pulled. An error on the worker side of the
//! exchange moves to `ABORTED`: the worker is terminated and everything
//! already appended to the sink stays there.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::io::{OutputCursor, RowSink, RowSource};
use crate::codec::TextCodec;
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{RowBatch, Schema};
use crate::wire::{BatchDecoder, BatchEncoder, Frame, Reply};
use crate::worker::{ChannelOptions, WorkerChannel, WorkerCommand, WorkerHandle};

/// Lifecycle of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExchangeState {
    /// Worker spawned, no I/O yet.
    Ready,
    Streaming,
    /// End-of-stream sent, waiting for the final reply.
    Draining,
    Aborted,
    Done,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "READY",
            Self::Streaming => "STREAMING",
            Self::Draining => "DRAINING",
            Self::Aborted => "ABORTED",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// What an exchange did.
#[derive(Debug, Default)]
pub struct ExchangeSummary {
    pub batches_sent: u64,
    pub replies_appended: u64,
    pub rows_sent: u64,
    pub rows_received: u64,
    /// Set when the exchange aborted.
    pub error: Option<ExchangeError>,
}

impl ExchangeSummary {
    pub fn aborted(&self) -> bool {
        self.error.is_some()
    }

    /// Turn an aborted summary into its error.
    pub fn into_result(self) -> ExchangeResult<Self> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

impl fmt::Display for ExchangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {} rows in {} batches, received {} rows in {} replies",
            self.rows_sent, self.batches_sent, self.rows_received, self.replies_appended
        )?;
        if let Some(e) = &self.error {
            write!(f, "; aborted: {}", e)?;
        }
        Ok(())
    }
}

/// Where a failure came from.
enum Failure {
    /// The worker side: encode, pipe I/O, decode. Aborts the exchange.
    Worker(ExchangeError),
    /// The host side: source or sink. Returned to the caller as is.
    Host(ExchangeError),
}

/// One streaming exchange with one worker.
#[derive(Debug)]
pub struct Exchange {
    encoder: BatchEncoder,
    decoder: BatchDecoder,
    channel: WorkerChannel,
    state: ExchangeState,
    cursor: OutputCursor,
    summary: ExchangeSummary,
}

impl Exchange {
    /// Validate both schemas against the channel's format, then spawn the
    /// worker.
    ///
    /// Schema problems are reported before any process is created.
    pub async fn spawn(
        command: &WorkerCommand,
        input: Schema,
        output: Schema,
        text: TextCodec,
        options: ChannelOptions,
    ) -> ExchangeResult<Self> {
        let encoder = BatchEncoder::new(options.format, input, text.clone())?;
        let decoder = BatchDecoder::new(options.format, output, text)?;
        let handle = WorkerHandle::spawn(command).await?;
        Ok(Self::from_parts(
            encoder,
            decoder,
            WorkerChannel::new(handle, options),
        ))
    }

    /// Assemble an exchange over an existing channel.
    pub fn from_parts(encoder: BatchEncoder, decoder: BatchDecoder, channel: WorkerChannel) -> Self {
        Self {
            encoder,
            decoder,
            channel,
            state: ExchangeState::Ready,
            cursor: OutputCursor::default(),
            summary: ExchangeSummary::default(),
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn channel(&self) -> &WorkerChannel {
        &self.channel
    }

    /// Stream every batch of `source` through the worker into `sink`.
    ///
    /// A worker-side failure does not make this return `Err`: the exchange
    /// aborts and the summary carries the error. Source and sink errors are
    /// returned after the worker has been terminated.
    pub async fn run<S, K>(mut self, source: &mut S, sink: &mut K) -> ExchangeResult<ExchangeSummary>
    where
        S: RowSource + ?Sized,
        K: RowSink + ?Sized,
    {
        let outcome = self.stream(source, sink).await;
        match outcome {
            Ok(()) => {}
            Err(Failure::Worker(e)) => {
                self.transition(ExchangeState::Aborted);
                warn!(error = %e, class = ?e.class(), "exchange aborted");
                self.summary.error = Some(e);
            }
            Err(Failure::Host(e)) => {
                self.channel.terminate().await;
                self.transition(ExchangeState::Done);
                return Err(e);
            }
        }

        self.channel.terminate().await;
        self.transition(ExchangeState::Done);
        sink.finish().await?;
        info!(
            batches = self.summary.batches_sent,
            rows_sent = self.summary.rows_sent,
            rows_received = self.summary.rows_received,
            aborted = self.summary.aborted(),
            "exchange finished"
        );
        Ok(self.summary)
    }

    async fn stream<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<(), Failure>
    where
        S: RowSource + ?Sized,
        K: RowSink + ?Sized,
    {
        self.transition(ExchangeState::Streaming);
        loop {
            if !self.channel.is_alive() {
                return Err(Failure::Worker(ExchangeError::WorkerDead));
            }
            let Some(batch) = source.next_batch().await.map_err(Failure::Host)? else {
                break;
            };
            if batch.is_empty() {
                debug!("skipping empty input batch");
                continue;
            }

            let frame = self.encoder.encode(&batch).map_err(Failure::Worker)?;
            self.channel.send(&frame).await.map_err(Failure::Worker)?;
            self.summary.batches_sent += 1;
            self.summary.rows_sent += batch.num_rows() as u64;

            match self.receive(false).await? {
                Reply::Batch(reply) => self.append(sink, reply).await?,
                Reply::Empty => debug!("worker produced no rows this round"),
                Reply::EndOfStream => {
                    info!("worker ended the stream early");
                    return Ok(());
                }
            }
        }

        self.transition(ExchangeState::Draining);
        self.channel.send(&Frame::End).await.map_err(Failure::Worker)?;
        if let Reply::Batch(reply) = self.receive(true).await? {
            self.append(sink, reply).await?;
        }
        Ok(())
    }

    async fn receive(&mut self, eof_allowed: bool) -> Result<Reply, Failure> {
        let frame = self
            .channel
            .receive(eof_allowed)
            .await
            .map_err(Failure::Worker)?;
        self.decoder.decode(&frame).map_err(Failure::Worker)
    }

    async fn append<K>(&mut self, sink: &mut K, batch: RowBatch) -> Result<(), Failure>
    where
        K: RowSink + ?Sized,
    {
        let rows = batch.num_rows();
        let cursor = self.cursor;
        sink.append(batch, cursor).await.map_err(Failure::Host)?;
        self.cursor = cursor.advance(rows);
        self.summary.replies_appended += 1;
        self.summary.rows_received += rows as u64;
        debug!(chunk = cursor.chunk, row = cursor.row, rows, "appended reply");
        Ok(())
    }

    fn transition(&mut self, next: ExchangeState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "exchange state");
            self.state = next;
        }
    }
}
