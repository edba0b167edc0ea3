//! Codec module - structured encodings for frame payloads.
//!
//! - [`JsonCodec`] - `serde_json`, sent as text frames (the default)
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde`, sent as binary frames
//!
//! # Design
//!
//! Codecs are marker structs implementing [`Codec`] with associated functions
//! only. They are selected at compile time as a type parameter, e.g.
//! `conn.write_structured_with::<MsgPackCodec, _>(&value)`.
//!
//! Encoders write straight into an [`std::io::Write`] so callers can encode
//! into the outbound frame buffer without an intermediate allocation.
//!
//! # Example
//!
//! ```
//! use wsdispatch::codec::{Codec, JsonCodec, MsgPackCodec};
//!
//! let encoded = JsonCodec::encode(&"hello").unwrap();
//! assert_eq!(encoded, br#""hello""#);
//!
//! let encoded = MsgPackCodec::encode(&42u32).unwrap();
//! let decoded: u32 = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, 42);
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use std::io::Write;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::protocol::FrameType;

/// A structured encoding usable by `write_structured_with` and
/// `Payload::decode_with`.
pub trait Codec {
    /// Frame type used when sending values encoded with this codec.
    const FRAME_TYPE: FrameType;

    /// Encode `value` into `writer`.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized or the writer fails.
    fn encode_into<W, T>(writer: W, value: &T) -> Result<()>
    where
        W: Write,
        T: Serialize + ?Sized;

    /// Decode bytes into a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;

    /// Encode `value` into a fresh buffer.
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        Self::encode_into(&mut buf, value)?;
        Ok(buf)
    }
}
