//! JSON codec using `serde_json`.

use std::io::Write;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Codec;
use crate::error::Result;
use crate::protocol::FrameType;

/// JSON codec for structured data, sent as text frames.
pub struct JsonCodec;

impl Codec for JsonCodec {
    const FRAME_TYPE: FrameType = FrameType::Text;

    #[inline]
    fn encode_into<W, T>(writer: W, value: &T) -> Result<()>
    where
        W: Write,
        T: Serialize + ?Sized,
    {
        Ok(serde_json::to_writer(writer, value)?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
