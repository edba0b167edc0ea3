//! MsgPack codec using `rmp-serde`.
//!
//! Structs are always written with field names (struct-as-map), never
//! positionally, so peers in other languages can decode them as objects.
//!
//! # Example
//!
//! ```
//! use wsdispatch::codec::{Codec, MsgPackCodec};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "hello".to_string() };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: Message = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use std::io::Write;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Codec;
use crate::error::Result;
use crate::protocol::FrameType;

/// MessagePack codec for structured data, sent as binary frames.
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    const FRAME_TYPE: FrameType = FrameType::Binary;

    #[inline]
    fn encode_into<W, T>(mut writer: W, value: &T) -> Result<()>
    where
        W: Write,
        T: Serialize + ?Sized,
    {
        // write_named, NOT write: structs must stay maps.
        Ok(rmp_serde::encode::write_named(&mut writer, value)?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
