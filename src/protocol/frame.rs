//! Frame types and close codes shared by the connection and transports.
//!
//! # Example
//!
//! ```
//! use wsdispatch::protocol::{CloseCode, FrameType, Inbound};
//! use bytes::Bytes;
//!
//! let inbound = Inbound::Frame(FrameType::Text, Bytes::from_static(b"{}"));
//! assert!(!inbound.is_close());
//!
//! let close = Inbound::close(CloseCode::NORMAL, "bye");
//! assert!(close.is_close());
//! assert_eq!(u16::from(CloseCode::NORMAL), 1000);
//! ```

use std::fmt;

use bytes::Bytes;

/// Kind of a data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// UTF-8 text frame.
    Text,
    /// Binary frame.
    Binary,
}

impl FrameType {
    /// Check if this is a text frame.
    #[inline]
    pub fn is_text(self) -> bool {
        self == FrameType::Text
    }

    /// Check if this is a binary frame.
    #[inline]
    pub fn is_binary(self) -> bool {
        self == FrameType::Binary
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Text => f.write_str("text"),
            FrameType::Binary => f.write_str("binary"),
        }
    }
}

/// Status code carried by a close notification.
///
/// Transport agnostic; the WebSocket transport maps it onto RFC 6455 codes
/// one to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// Endpoint is going away (server shutdown, page navigation).
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// Protocol error.
    pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
    /// Close frame carried no status code. Never sent on the wire.
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    /// Connection dropped without a close handshake. Never sent on the wire.
    pub const ABNORMAL: CloseCode = CloseCode(1006);
    /// Endpoint hit an unexpected condition.
    pub const INTERNAL_ERROR: CloseCode = CloseCode(1011);

    /// Raw numeric value.
    #[inline]
    pub fn as_u16(self) -> u16 {
        self.0
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        CloseCode(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Successful outcome of a single transport read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A fully buffered data frame.
    Frame(FrameType, Bytes),
    /// The peer (or the protocol layer) closed the connection.
    Close {
        /// Status code from the close frame.
        code: CloseCode,
        /// Human-readable reason, may be empty.
        reason: String,
    },
}

impl Inbound {
    /// Build a close signal.
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Inbound::Close {
            code,
            reason: reason.into(),
        }
    }

    /// Check if this is a close signal.
    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, Inbound::Close { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_predicates() {
        assert!(FrameType::Text.is_text());
        assert!(!FrameType::Text.is_binary());
        assert!(FrameType::Binary.is_binary());
        assert_eq!(FrameType::Binary.to_string(), "binary");
    }

    #[test]
    fn test_close_code_conversions() {
        assert_eq!(CloseCode::from(1000), CloseCode::NORMAL);
        assert_eq!(u16::from(CloseCode::ABNORMAL), 1006);
        assert_eq!(CloseCode::INTERNAL_ERROR.as_u16(), 1011);
        assert_eq!(CloseCode(4000).to_string(), "4000");
    }

    #[test]
    fn test_inbound_close() {
        let inbound = Inbound::close(CloseCode::GOING_AWAY, "restart");
        assert_eq!(
            inbound,
            Inbound::Close {
                code: CloseCode(1001),
                reason: "restart".to_string()
            }
        );
        assert!(!Inbound::Frame(FrameType::Binary, Bytes::new()).is_close());
    }
}
