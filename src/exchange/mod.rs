//! Streaming exchange between a host row source and a worker process.

mod io;
mod orchestrator;

pub use io::{MemorySink, MemorySource, OutputCursor, RowSink, RowSource};
pub use orchestrator::{Exchange, ExchangeState, ExchangeSummary};
