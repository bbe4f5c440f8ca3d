//! Framed, blocking-style I/O over a worker's pipes.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace, warn};

use super::process::WorkerHandle;
use crate::error::{ExchangeError, ExchangeResult};
use crate::wire::frame::{parse_row_count, LENGTH_PREFIX_BYTES};
use crate::wire::{Frame, WireFormat};

/// Default upper bound on a single binary frame (1 GiB).
pub const DEFAULT_MAX_FRAME_BYTES: u64 = 1 << 30;

/// Framing parameters for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    pub format: WireFormat,
    /// Terminates the text header line and every text row.
    pub line_delimiter: u8,
    /// Upper bound on the wait for one complete reply. `None` waits forever.
    pub receive_timeout: Option<Duration>,
    /// Largest binary payload accepted from the worker.
    pub max_frame_bytes: u64,
}

impl ChannelOptions {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            line_delimiter: b'\n',
            receive_timeout: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::new(WireFormat::Text)
    }
}

/// Sends and receives whole frames over a worker's stdin and stdout.
///
/// Every operation completes fully or fails. A failure of either direction
/// terminates the worker before the error is returned, so a channel that
/// has returned an error is dead for good.
#[derive(Debug)]
pub struct WorkerChannel {
    handle: WorkerHandle,
    options: ChannelOptions,
}

impl WorkerChannel {
    pub fn new(handle: WorkerHandle, options: ChannelOptions) -> Self {
        Self { handle, options }
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    pub fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut WorkerHandle {
        &mut self.handle
    }

    pub fn into_handle(self) -> WorkerHandle {
        self.handle
    }

    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }

    /// Write one complete frame and flush it.
    pub async fn send(&mut self, frame: &Frame) -> ExchangeResult<()> {
        let result = self.write_frame(frame).await;
        if let Err(e) = &result {
            warn!(error = %e, "send to worker failed");
            self.handle.terminate().await;
        }
        result
    }

    /// Read one complete frame.
    ///
    /// With `eof_allowed`, a clean end of the worker's output at a frame
    /// boundary yields [`Frame::End`]; otherwise it is
    /// [`ExchangeError::WorkerExited`].
    pub async fn receive(&mut self, eof_allowed: bool) -> ExchangeResult<Frame> {
        let result = match self.options.receive_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.read_frame(eof_allowed)).await {
                Ok(result) => result,
                Err(_) => Err(ExchangeError::Timeout(limit)),
            },
            None => self.read_frame(eof_allowed).await,
        };
        if let Err(e) = &result {
            warn!(error = %e, "receive from worker failed");
            self.handle.terminate().await;
        }
        result
    }

    /// Terminate the worker. Idempotent.
    pub async fn terminate(&mut self) {
        self.handle.terminate().await;
    }

    async fn write_frame(&mut self, frame: &Frame) -> ExchangeResult<()> {
        let format = self.options.format;
        let delimiter = self.options.line_delimiter;
        let stdin = self.handle.writer()?;

        let written = async {
            match (format, frame) {
                (WireFormat::Binary, Frame::Binary { payload }) => {
                    stdin.write_all(&(payload.len() as u64).to_le_bytes()).await?;
                    stdin.write_all(payload).await?;
                }
                (WireFormat::Binary, Frame::End) => {
                    stdin.write_all(&0u64.to_le_bytes()).await?;
                }
                (WireFormat::Text, Frame::Text { row_count, body }) => {
                    stdin.write_all(row_count.to_string().as_bytes()).await?;
                    stdin.write_all(&[delimiter]).await?;
                    stdin.write_all(body).await?;
                }
                (WireFormat::Text, Frame::End) => {
                    stdin.write_all(&[b'0', delimiter]).await?;
                }
                (_, other) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("cannot send {:?} frame on a {} channel", other, format),
                    ))
                }
            }
            stdin.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                trace!(format = %format, end = frame.is_end(), "sent frame");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Err(
                ExchangeError::CorruptPayload(e.to_string()),
            ),
            Err(e) => {
                self.handle.mark_dead();
                Err(ExchangeError::WriteFailed(e))
            }
        }
    }

    async fn read_frame(&mut self, eof_allowed: bool) -> ExchangeResult<Frame> {
        let frame = match self.options.format {
            WireFormat::Text => self.read_text(eof_allowed).await,
            WireFormat::Binary => self.read_binary(eof_allowed).await,
        };
        if let Err(ExchangeError::ReadFailed(_) | ExchangeError::WorkerExited) = &frame {
            self.handle.mark_dead();
        }
        frame
    }

    async fn read_text(&mut self, eof_allowed: bool) -> ExchangeResult<Frame> {
        let delimiter = self.options.line_delimiter;
        let stdout = self.handle.reader()?;

        let mut header = Vec::new();
        let n = stdout
            .read_until(delimiter, &mut header)
            .await
            .map_err(ExchangeError::ReadFailed)?;
        if n == 0 {
            return end_of_output(eof_allowed);
        }
        if header.last() != Some(&delimiter) {
            return Err(ExchangeError::MalformedHeader(format!(
                "header {:?} is not terminated",
                String::from_utf8_lossy(&header)
            )));
        }
        header.pop();
        let header = std::str::from_utf8(&header)
            .map_err(|_| ExchangeError::MalformedHeader("header is not UTF-8".to_string()))?;
        let row_count = parse_row_count(header)?;

        let mut body = Vec::new();
        for line in 0..row_count {
            let n = stdout
                .read_until(delimiter, &mut body)
                .await
                .map_err(ExchangeError::ReadFailed)?;
            if n == 0 || body.last() != Some(&delimiter) {
                return Err(ExchangeError::LineCountMismatch {
                    expected: row_count,
                    actual: line,
                });
            }
        }
        debug!(rows = row_count, bytes = body.len(), "received text frame");
        Ok(Frame::Text { row_count, body })
    }

    async fn read_binary(&mut self, eof_allowed: bool) -> ExchangeResult<Frame> {
        let limit = self.options.max_frame_bytes;
        let stdout = self.handle.reader()?;

        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        let n = hard_read(stdout, &mut prefix).await?;
        if n == 0 {
            return end_of_output(eof_allowed);
        }
        if n < LENGTH_PREFIX_BYTES {
            return Err(ExchangeError::ShortRead {
                expected: LENGTH_PREFIX_BYTES,
                actual: n,
            });
        }
        let size = u64::from_le_bytes(prefix);
        if size == 0 {
            debug!("received end-of-stream frame");
            return Ok(Frame::End);
        }
        if size > limit {
            return Err(ExchangeError::FrameTooLarge { size, limit });
        }

        let expected = size as usize;
        let mut payload = vec![0u8; expected];
        let n = hard_read(stdout, &mut payload).await?;
        if n < expected {
            return Err(ExchangeError::ShortRead {
                expected,
                actual: n,
            });
        }
        debug!(bytes = expected, "received binary frame");
        Ok(Frame::Binary { payload })
    }
}

fn end_of_output(eof_allowed: bool) -> ExchangeResult<Frame> {
    if eof_allowed {
        debug!("worker closed its output");
        Ok(Frame::End)
    } else {
        Err(ExchangeError::WorkerExited)
    }
}

/// Read until `buf` is full or the stream ends; returns the bytes read.
async fn hard_read<R>(reader: &mut R, buf: &mut [u8]) -> ExchangeResult<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(ExchangeError::ReadFailed)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
