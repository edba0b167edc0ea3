//! Transport module - the boundary to the wire-level connection.
//!
//! A transport owns handshake, framing, ping/pong and TLS. The connection
//! only needs three operations from it, split across two halves so the
//! dispatch loop can read while other tasks write:
//!
//! - [`FrameReader::read_frame`] - next frame or close signal; a peer that
//!   vanished without a close handshake is reported as
//!   [`Error::Disconnected`](crate::Error::Disconnected)
//! - [`FrameWriter::write_frame`] - send one frame
//! - [`FrameWriter::close`] - start the close handshake
//!
//! [`WsTransport`] implements these over `tokio-tungstenite`.

mod websocket;

pub use websocket::{connect, handshake, WsReader, WsTransport, WsWriter};

use bytes::Bytes;

use crate::error::Result;
use crate::handler::BoxFuture;
use crate::protocol::{CloseCode, FrameType, Inbound};

/// Read half of a transport. Only the dispatch loop reads.
pub trait FrameReader: Send + 'static {
    /// Wait for the next frame or close signal.
    fn read_frame(&mut self) -> BoxFuture<'_, Result<Inbound>>;
}

/// Write half of a transport, owned by the connection's writer task.
pub trait FrameWriter: Send + 'static {
    /// Send one complete frame.
    fn write_frame(&mut self, frame_type: FrameType, payload: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Send a close signal with the given status.
    fn close(&mut self, code: CloseCode, reason: String) -> BoxFuture<'_, Result<()>>;

    /// Flush and release the write half. Called once, when the dispatch
    /// loop has stopped.
    fn shutdown(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// A connected, duplex, message-oriented transport.
pub trait Transport: Send + 'static {
    /// Read half.
    type Reader: FrameReader;
    /// Write half.
    type Writer: FrameWriter;

    /// Split into independently owned halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}
