//! Error types for wsdispatch.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Main error type for all connection operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection is closed; no further writes succeed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The peer went away without a close handshake.
    #[error("Peer disconnected without a close handshake")]
    Disconnected,

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// WebSocket protocol or stream error.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// Any other transport failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(e))
    }
}

impl Error {
    /// Check if this error is a decode/encode failure of the payload codec.
    pub fn is_codec(&self) -> bool {
        matches!(
            self,
            Error::Json(_) | Error::MsgPackEncode(_) | Error::MsgPackDecode(_)
        )
    }
}

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
