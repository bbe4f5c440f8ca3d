//! # rowpipe
//!
//! Streams typed row batches through an external worker process and
//! collects the typed rows it sends back.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                RowSource (host input)                    │
//! └─────────────────────────────────────────────────────────┘
//!                          │ RowBatch
//!                          ▼ [BatchEncoder + codec]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Frame: text lines or length-prefixed binary       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [WorkerChannel]
//! ┌─────────────────────────────────────────────────────────┐
//! │            Worker process (stdin → stdout)               │
//! └─────────────────────────────────────────────────────────┘
//!                          │ reply Frame
//!                          ▼ [BatchDecoder + codec]
//! ┌─────────────────────────────────────────────────────────┐
//! │        RowSink (host output, with OutputCursor)          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`exchange::Exchange`] state machine drives one batch at a time
//! through this pipeline and owns the worker for its whole lifetime.

pub mod codec;
pub mod config;
pub mod error;
pub mod exchange;
pub mod types;
pub mod wire;
pub mod worker;

pub use error::{ErrorClass, ExchangeError, ExchangeResult};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::codec::{Stringifiers, TextCodec, TextOptions};
    pub use crate::config::Settings;
    pub use crate::error::{ErrorClass, ExchangeError, ExchangeResult};
    pub use crate::exchange::{
        Exchange, ExchangeState, ExchangeSummary, MemorySink, MemorySource, OutputCursor,
        RowSink, RowSource,
    };
    pub use crate::types::{Column, DataType, Field, RowBatch, Schema, Value};
    pub use crate::wire::{BatchDecoder, BatchEncoder, Frame, Reply, WireFormat};
    pub use crate::worker::{ChannelOptions, WorkerChannel, WorkerCommand, WorkerHandle};
}
