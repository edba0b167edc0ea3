//! Inbound frame payload.
//!
//! A [`Payload`] wraps the bytes of one fully buffered frame. Cloning is
//! cheap (reference counted), so a handler may keep it past the dispatch
//! call.
//!
//! # Example
//!
//! ```
//! use wsdispatch::Payload;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, Default)]
//! struct Envelope {
//!     op: u8,
//! }
//!
//! let payload = Payload::from_static(br#"{"op":1}"#);
//! let mut envelope = Envelope::default();
//! payload.decode_into(&mut envelope).unwrap();
//! assert_eq!(envelope.op, 1);
//! ```
//!
//! The decode target must be a mutable reference:
//!
//! ```compile_fail
//! use wsdispatch::Payload;
//!
//! let payload = Payload::from_static(b"1");
//! let op = 0u8;
//! payload.decode_into(op).unwrap();
//! ```

use std::ops::Deref;

use bytes::buf::Reader;
use bytes::{Buf, Bytes};
use serde::de::DeserializeOwned;

use crate::codec::{Codec, JsonCodec};
use crate::error::Result;

/// Streaming view handed to reader handlers.
pub type PayloadReader = Reader<Bytes>;

/// Immutable content of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload(Bytes);

impl Payload {
    /// Create from bytes.
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Create from a static slice.
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    /// Get the bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Cheap clone of the underlying `Bytes`.
    #[inline]
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// Into bytes.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Streaming `std::io::Read` view over the content.
    pub fn reader(&self) -> PayloadReader {
        self.0.clone().reader()
    }

    /// Decode the JSON content into a new value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the bytes are not valid
    /// JSON or do not match the shape of `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        self.decode_with::<JsonCodec, T>()
    }

    /// Decode the JSON content into `target`.
    ///
    /// On failure `target` is left untouched.
    pub fn decode_into<T: DeserializeOwned>(&self, target: &mut T) -> Result<()> {
        self.decode_into_with::<JsonCodec, T>(target)
    }

    /// Decode the content with an explicit codec.
    pub fn decode_with<C: Codec, T: DeserializeOwned>(&self) -> Result<T> {
        C::decode(&self.0)
    }

    /// Decode the content into `target` with an explicit codec.
    pub fn decode_into_with<C: Codec, T: DeserializeOwned>(&self, target: &mut T) -> Result<()> {
        *target = C::decode(&self.0)?;
        Ok(())
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}
