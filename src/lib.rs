//! # wsdispatch
//!
//! Callback-driven WebSocket connections.
//!
//! A [`Connection`] wraps an established WebSocket (or any [`Transport`]),
//! reads frames on a dedicated loop and hands each frame to every registered
//! message handler. Handlers run inline, in registration order, or on their
//! own task when switched to async mode.
//!
//! ## Architecture
//!
//! - **Dispatch loop**: sole reader of the transport, routes frames to
//!   handlers and close/error signals to the connection callbacks
//! - **Writer task**: sole owner of the write half, serializes writes from
//!   handlers and `close()`
//!
//! ## Example
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use wsdispatch::{CloseCode, Connection};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Envelope {
//!     op: u8,
//!     data: serde_json::Value,
//! }
//!
//! #[tokio::main]
//! async fn main() -> wsdispatch::Result<()> {
//!     let conn = wsdispatch::dial("ws://localhost:5555").await?;
//!
//!     conn.on_message(|conn, _frame_type, payload| async move {
//!         let envelope: Envelope = payload.decode()?;
//!         conn.write_json(&envelope).await
//!     });
//!     conn.on_close(|conn, code, reason| {
//!         tracing::info!(id = %conn.id(), %code, reason, "closed");
//!     });
//!
//!     conn.write_json(&Envelope { op: 1, data: "hi".into() }).await?;
//!     conn.close(CloseCode::NORMAL, "done").await
//! }
//! ```
//!
//! ## Transport
//!
//! Anything implementing [`Transport`] can back a connection; the bundled
//! [`WsTransport`](transport::WsTransport) runs over `tokio-tungstenite`.

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;

mod connection;
mod dispatch;
mod writer;

#[cfg(test)]
mod testutil;

pub use codec::{Codec, JsonCodec, MsgPackCodec};
pub use connection::{
    accept, dial, CloseHandler, Connection, ConnectionBuilder, ConnectionConfig, ErrorHandler,
    DEFAULT_MAX_CONCURRENT_HANDLERS,
};
pub use error::{Error, Result};
pub use handler::{HandlerHandle, HandlerResult, Payload, PayloadReader};
pub use protocol::{CloseCode, FrameType};
pub use transport::Transport;
pub use writer::DEFAULT_CHANNEL_CAPACITY;
