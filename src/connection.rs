//! Connection handle, builder and factory functions.
//!
//! The [`ConnectionBuilder`] configures and starts a [`Connection`] on top of
//! any [`Transport`]. Starting a connection spawns two tasks:
//! 1. the writer task, owning the transport's write half
//! 2. the dispatch loop, reading frames and invoking callbacks
//!
//! Both must be started from within a tokio runtime.
//!
//! # Example
//!
//! ```ignore
//! use wsdispatch::{CloseCode, ConnectionBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = ConnectionBuilder::new()
//!         .max_concurrent_handlers(64)
//!         .dial("ws://localhost:5555")
//!         .await?;
//!
//!     conn.on_close(|conn, code, reason| {
//!         println!("{} closed: {} {}", conn.id(), code, reason);
//!     });
//!     conn.on_message(|conn, _frame_type, payload| async move {
//!         let hello: Hello = payload.decode()?;
//!         conn.write_json(&hello).await
//!     });
//!
//!     conn.write_json(&Hello { message: "Hey server!".into() }).await?;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::buf::BufMut;
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, Semaphore};
use uuid::Uuid;

use crate::codec::{Codec, JsonCodec};
use crate::dispatch;
use crate::error::{Error, Result};
use crate::handler::{
    Callback, HandlerHandle, HandlerRegistry, HandlerResult, Payload, PayloadReader,
};
use crate::protocol::{CloseCode, FrameType};
use crate::transport::{self, Transport};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Default maximum concurrently running async handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Close notification callback.
pub type CloseHandler = dyn Fn(&Connection, CloseCode, &str) + Send + Sync;

/// Error notification callback.
pub type ErrorHandler = dyn Fn(&Connection, &Error) + Send + Sync;

/// Signal from `close()` to the dispatch loop.
pub(crate) type CloseSignal = Option<(CloseCode, String)>;

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Capacity of the writer task's request queue.
    pub channel_capacity: usize,
    /// Maximum async handlers running at once. When reached, the dispatch
    /// loop waits for one to finish before spawning another.
    pub max_concurrent_handlers: usize,
    /// Execution mode of newly registered handlers.
    pub default_async: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            default_async: false,
        }
    }
}

/// Builder for configuring and starting a [`Connection`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn with_config(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Set the writer queue capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the maximum number of concurrently running async handlers.
    ///
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Register new handlers as async by default.
    pub fn default_async(mut self, is_async: bool) -> Self {
        self.config.default_async = is_async;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Start a connection on an established transport.
    pub fn build<T: Transport>(self, transport: T) -> Connection {
        Connection::start(transport, self.config)
    }

    /// Dial a WebSocket URL and start a connection on it.
    pub async fn dial(self, url: &str) -> Result<Connection> {
        let transport = transport::connect(url).await?;
        Ok(self.build(transport))
    }

    /// Run the WebSocket server handshake on `stream` and start a
    /// connection on it.
    pub async fn accept<S>(self, stream: S) -> Result<Connection>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let transport = transport::handshake(stream).await?;
        Ok(self.build(transport))
    }
}

/// Dial a WebSocket URL with default settings.
pub async fn dial(url: &str) -> Result<Connection> {
    ConnectionBuilder::new().dial(url).await
}

/// Accept a WebSocket connection on `stream` with default settings.
pub async fn accept<S>(stream: S) -> Result<Connection>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    ConnectionBuilder::new().accept(stream).await
}

pub(crate) struct ConnectionInner {
    id: String,
    closed: AtomicBool,
    pub(crate) registry: HandlerRegistry,
    on_close: RwLock<Option<Arc<CloseHandler>>>,
    on_error: RwLock<Option<Arc<ErrorHandler>>>,
    writer: WriterHandle,
    shutdown: watch::Sender<CloseSignal>,
    default_async: bool,
}

/// A running connection.
///
/// Cheap to clone; every clone refers to the same connection. The dispatch
/// loop keeps the connection alive until it stops.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a new connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Start a connection on `transport` with default settings.
    pub fn new<T: Transport>(transport: T) -> Self {
        ConnectionBuilder::new().build(transport)
    }

    fn start<T: Transport>(transport: T, config: ConnectionConfig) -> Self {
        let (reader, writer) = transport.split();

        let writer_config = WriterConfig {
            channel_capacity: config.channel_capacity,
        };
        let (writer, _writer_task) = spawn_writer_task(writer, &writer_config);

        let (shutdown, shutdown_rx) = watch::channel(None);
        let conn = Connection {
            inner: Arc::new(ConnectionInner {
                id: Uuid::now_v7().to_string(),
                closed: AtomicBool::new(false),
                registry: HandlerRegistry::new(),
                on_close: RwLock::new(None),
                on_error: RwLock::new(None),
                writer,
                shutdown,
                default_async: config.default_async,
            }),
        };

        let permits = Arc::new(Semaphore::new(config.max_concurrent_handlers.max(1)));
        tokio::spawn(dispatch::run(conn.clone(), reader, shutdown_rx, permits));

        conn
    }

    /// Unique, time-sortable identifier assigned at construction.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether the connection has reached the terminal closed state.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of registered message handlers.
    pub fn handler_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Close the connection.
    ///
    /// Idempotent: if the connection is already closed this returns
    /// `Ok(())` and the transport is not touched again. The close callback
    /// is invoked by the dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if sending the close signal failed.
    /// The connection is closed either way.
    pub async fn close(&self, code: CloseCode, reason: &str) -> Result<()> {
        if !self.mark_closed() {
            return Ok(());
        }
        tracing::debug!(id = %self.id(), %code, "Closing connection");

        let result = self.inner.writer.close(code, reason.to_string()).await;
        self.inner
            .shutdown
            .send_replace(Some((code, reason.to_string())));
        result
    }

    /// Send a frame.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] once closed, otherwise the transport's
    /// write error.
    pub async fn write(&self, frame_type: FrameType, data: impl Into<Bytes>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.inner.writer.write(frame_type, data.into()).await
    }

    /// Encode `value` as JSON and send it as a text frame.
    pub async fn write_structured<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.write_structured_with::<JsonCodec, T>(value).await
    }

    /// Alias of [`Connection::write_structured`].
    pub async fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.write_structured(value).await
    }

    /// Encode `value` with codec `C` and send it.
    ///
    /// The value is encoded straight into the buffer that becomes the
    /// outbound frame.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] once closed, the codec's error, or the
    /// transport's write error.
    pub async fn write_structured_with<C, T>(&self, value: &T) -> Result<()>
    where
        C: Codec,
        T: Serialize + ?Sized,
    {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let mut buf = BytesMut::new().writer();
        C::encode_into(&mut buf, value)?;
        self.inner
            .writer
            .write(C::FRAME_TYPE, buf.into_inner().freeze())
            .await
    }

    /// Set the close callback, replacing any previous one.
    pub fn on_close<F>(&self, f: F)
    where
        F: Fn(&Connection, CloseCode, &str) + Send + Sync + 'static,
    {
        *self
            .inner
            .on_close
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(f));
    }

    /// Set the error callback, replacing any previous one.
    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&Connection, &Error) + Send + Sync + 'static,
    {
        *self
            .inner
            .on_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(f));
    }

    /// Register a handler receiving each frame as a [`Payload`].
    pub fn on_message<F, Fut>(&self, f: F) -> HandlerHandle
    where
        F: Fn(Connection, FrameType, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(Callback::payload(f))
    }

    /// Register a handler receiving each frame as an owned, mutable buffer.
    pub fn on_message_buffer<F, Fut>(&self, f: F) -> HandlerHandle
    where
        F: Fn(Connection, FrameType, BytesMut) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(Callback::buffer(f))
    }

    /// Register a handler receiving each frame as a `std::io::Read`.
    pub fn on_message_reader<F, Fut>(&self, f: F) -> HandlerHandle
    where
        F: Fn(Connection, FrameType, PayloadReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(Callback::reader(f))
    }

    fn register(&self, callback: Callback) -> HandlerHandle {
        let handler = self.inner.registry.register(
            callback,
            self.inner.default_async,
            Arc::downgrade(&self.inner),
        );
        HandlerHandle::new(handler)
    }

    /// Transition to closed. Returns `true` for the caller that made the
    /// transition.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.inner.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    pub(crate) fn writer(&self) -> &WriterHandle {
        &self.inner.writer
    }

    pub(crate) fn close_handler(&self) -> Option<Arc<CloseHandler>> {
        self.inner
            .on_close
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn error_handler(&self) -> Option<Arc<ErrorHandler>> {
        self.inner
            .on_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .field("handlers", &self.inner.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;
    use crate::testutil::MockTransport;
    use serde::Deserialize;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Hello {
        message: String,
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Connection::builder()
            .channel_capacity(16)
            .max_concurrent_handlers(8)
            .default_async(true);

        assert_eq!(builder.config().channel_capacity, 16);
        assert_eq!(builder.config().max_concurrent_handlers, 8);
        assert!(builder.config().default_async);
    }

    #[test]
    fn test_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.max_concurrent_handlers, DEFAULT_MAX_CONCURRENT_HANDLERS);
        assert!(!config.default_async);
    }

    #[tokio::test]
    async fn test_ids_unique_and_sortable() {
        let (first, _p1) = MockTransport::new();
        let (second, _p2) = MockTransport::new();
        let first = Connection::new(first);
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = Connection::new(second);

        assert_ne!(first.id(), second.id());
        assert!(first.id() < second.id());
        assert_eq!(first.id(), first.clone().id());
    }

    #[tokio::test]
    async fn test_close_twice_closes_transport_once() {
        let (transport, peer) = MockTransport::new();
        let conn = Connection::new(transport);

        conn.close(CloseCode::NORMAL, "done").await.unwrap();
        conn.close(CloseCode::NORMAL, "again").await.unwrap();

        assert!(conn.is_closed());
        assert_eq!(peer.closes(), vec![(CloseCode::NORMAL, "done".to_string())]);
    }

    #[tokio::test]
    async fn test_concurrent_close_closes_transport_once() {
        let (transport, peer) = MockTransport::new();
        let conn = Connection::new(transport);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let conn = conn.clone();
                tokio::spawn(async move { conn.close(CloseCode::NORMAL, "race").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(peer.closes().len(), 1);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (transport, peer) = MockTransport::new();
        let conn = Connection::new(transport);

        conn.close(CloseCode::NORMAL, "").await.unwrap();

        assert!(matches!(
            conn.write(FrameType::Text, "late").await,
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(
            conn.write_json(&Hello {
                message: "late".into()
            })
            .await,
            Err(Error::ConnectionClosed)
        ));
        assert!(peer.writes().is_empty());
    }

    #[tokio::test]
    async fn test_write_delegates_to_transport() {
        let (transport, peer) = MockTransport::new();
        let conn = Connection::new(transport);

        conn.write(FrameType::Binary, vec![1u8, 2, 3]).await.unwrap();
        conn.write_json(&Hello {
            message: "hi".into(),
        })
        .await
        .unwrap();
        conn.write_structured_with::<MsgPackCodec, _>(&Hello {
            message: "packed".into(),
        })
        .await
        .unwrap();

        let writes = peer.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0], (FrameType::Binary, Bytes::from_static(&[1, 2, 3])));
        assert_eq!(
            writes[1],
            (FrameType::Text, Bytes::from_static(br#"{"message":"hi"}"#))
        );
        assert_eq!(writes[2].0, FrameType::Binary);
        let decoded: Hello = MsgPackCodec::decode(&writes[2].1).unwrap();
        assert_eq!(decoded.message, "packed");
    }

    #[tokio::test]
    async fn test_write_error_is_returned() {
        let (transport, peer) = MockTransport::new();
        let conn = Connection::new(transport);

        peer.fail_writes();

        assert!(matches!(
            conn.write(FrameType::Text, "x").await,
            Err(Error::Transport(_))
        ));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_self_close_invokes_close_handler() {
        let (transport, peer) = MockTransport::new();
        let conn = Connection::new(transport);
        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.on_close(move |_conn, code, reason| {
            let _ = tx.send((code, reason.to_string()));
        });

        conn.close(CloseCode::GOING_AWAY, "restart").await.unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(closed, Some((CloseCode::GOING_AWAY, "restart".to_string())));
        // the loop released the write half when it stopped
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(peer.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_handle_delete_and_set_async() {
        let (transport, _peer) = MockTransport::new();
        let conn = Connection::builder().default_async(true).build(transport);

        let first = conn.on_message(|_conn, _frame_type, _payload| async { Ok(()) });
        let second = conn.on_message_buffer(|_conn, _frame_type, _buffer| async { Ok(()) });
        let third = conn.on_message_reader(|_conn, _frame_type, _reader| async { Ok(()) });

        assert!(first.id() < second.id() && second.id() < third.id());
        assert!(first.is_async());
        first.set_async(false);
        assert!(!first.is_async());

        assert_eq!(conn.handler_count(), 3);
        assert!(second.delete());
        assert!(!second.delete());
        assert_eq!(conn.handler_count(), 2);

        let fourth = conn.on_message(|_conn, _frame_type, _payload| async { Ok(()) });
        assert!(fourth.id() > third.id());
    }

    #[test]
    fn test_handle_does_not_keep_connection_alive() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let handle = runtime.block_on(async {
            let (transport, _peer) = MockTransport::new();
            let conn = Connection::new(transport);
            conn.on_message(|_conn, _frame_type, _payload| async { Ok(()) })
        });
        // dropping the runtime drops the dispatch loop and its connection
        drop(runtime);

        assert!(!handle.delete());
    }
}
