//! WebSocket transport over `tokio-tungstenite`.
//!
//! Works with any `AsyncRead + AsyncWrite` stream: TCP sockets from
//! [`connect`]/[`handshake`], or in-process pipes wrapped with
//! `WebSocketStream::from_raw_socket`.
//!
//! # Example
//!
//! ```ignore
//! use wsdispatch::transport::{connect, WsTransport};
//! use wsdispatch::ConnectionBuilder;
//!
//! let transport = connect("ws://localhost:5555").await?;
//! let conn = ConnectionBuilder::new().build(transport);
//! ```

use std::io::ErrorKind;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{FrameReader, FrameWriter, Transport};
use crate::error::{Error, Result};
use crate::handler::BoxFuture;
use crate::protocol::{CloseCode, FrameType, Inbound};

/// WebSocket transport wrapping an established stream.
#[derive(Debug)]
pub struct WsTransport<S> {
    stream: WebSocketStream<S>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a stream whose handshake has completed.
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }

    /// Get the wrapped stream back.
    pub fn into_inner(self) -> WebSocketStream<S> {
        self.stream
    }
}

impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = WsReader<S>;
    type Writer = WsWriter<S>;

    fn split(self) -> (WsReader<S>, WsWriter<S>) {
        let (sink, stream) = self.stream.split();
        (WsReader { stream }, WsWriter { sink })
    }
}

/// Read half of a [`WsTransport`].
#[derive(Debug)]
pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S> FrameReader for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Ping, pong and raw frames are skipped; tungstenite answers pings
    /// itself.
    fn read_frame(&mut self) -> BoxFuture<'_, Result<Inbound>> {
        Box::pin(async move {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return Ok(Inbound::Frame(FrameType::Text, Bytes::from(text)));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        return Ok(Inbound::Frame(FrameType::Binary, Bytes::from(data)));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|cf| (CloseCode(cf.code.into()), cf.reason.into_owned()))
                            .unwrap_or((CloseCode::NO_STATUS, String::new()));
                        return Ok(Inbound::Close { code, reason });
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                    Some(Err(e)) => return Err(classify_read_error(e)),
                    None => return Err(Error::Disconnected),
                }
            }
        })
    }
}

/// Map a tungstenite read error onto the crate error, singling out the
/// ways a peer can vanish without a close handshake.
fn classify_read_error(e: tungstenite::Error) -> Error {
    match e {
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)
        | tungstenite::Error::ConnectionClosed => Error::Disconnected,
        tungstenite::Error::Io(io)
            if matches!(
                io.kind(),
                ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
            ) =>
        {
            Error::Disconnected
        }
        other => Error::from(other),
    }
}

/// Write half of a [`WsTransport`].
#[derive(Debug)]
pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> FrameWriter for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn write_frame(&mut self, frame_type: FrameType, payload: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let message = match frame_type {
                FrameType::Text => {
                    let text = String::from_utf8(payload.to_vec()).map_err(|e| {
                        Error::Transport(format!("text frame is not valid UTF-8: {e}"))
                    })?;
                    Message::Text(text)
                }
                FrameType::Binary => Message::Binary(payload.to_vec()),
            };
            self.sink.send(message).await?;
            Ok(())
        })
    }

    fn close(&mut self, code: CloseCode, reason: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let frame = CloseFrame {
                code: WsCloseCode::from(code.as_u16()),
                reason: reason.into(),
            };
            self.sink.send(Message::Close(Some(frame))).await?;
            Ok(())
        })
    }

    fn shutdown(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.sink.close().await?;
            Ok(())
        })
    }
}

/// Dial a WebSocket URL.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the handshake fails.
pub async fn connect(url: &str) -> Result<WsTransport<MaybeTlsStream<TcpStream>>> {
    let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
    Ok(WsTransport::new(stream))
}

/// Run the server side of the WebSocket handshake on an accepted stream.
///
/// # Errors
///
/// Returns an error if the handshake fails.
pub async fn handshake<S>(stream: S) -> Result<WsTransport<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let stream = tokio_tungstenite::accept_async(stream).await?;
    Ok(WsTransport::new(stream))
}
