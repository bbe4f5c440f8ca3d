//! Wire formats.
//!
//! The [`BatchEncoder`] turns input batches into request [`Frame`]s and the
//! [`BatchDecoder`] turns reply frames back into typed batches. Framing on
//! the pipe itself (length prefix, header line) is done by
//! [`crate::worker::WorkerChannel`].

mod decoder;
mod encoder;
pub mod frame;

pub use decoder::BatchDecoder;
pub use encoder::BatchEncoder;
pub use frame::{Frame, Reply, WireFormat};
