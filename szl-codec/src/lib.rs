//! Canonical byte encoding for Sawzall keys and values.
//!
//! Scalar encodings sort in value order under unsigned byte compare, a
//! concatenation of encodings is unambiguously decodable, and every
//! encoding round-trips. Keys built this way can be range-scanned and
//! merged byte-reversibly by the table runtime.

mod decoder;
mod encoder;
mod error;
mod key;
mod pretty;
pub mod tags;
mod value_codec;

pub use decoder::{Decoder, Token};
pub use encoder::{Encoder, Version};
pub use error::CodecError;
pub use key::encode_key_from_string;
pub use value_codec::ValueCodec;
