//! Value codecs.
//!
//! [`text`] converts single cells to and from their textual form;
//! [`binary`] converts whole columns to and from Arrow arrays. Both are
//! used by the batch encoder and decoder in [`crate::wire`].

pub mod binary;
mod stringify;
pub mod text;

pub use binary::{decode_binary_column, encode_binary_column, to_record_batch};
pub use stringify::{Stringifiers, StringifyFn};
pub use text::{TextCodec, TextOptions};
