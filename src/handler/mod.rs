//! Handler module - message handlers and their registry.
//!
//! Provides:
//! - [`Payload`] - content of one inbound frame
//! - `HandlerRegistry` - id → handler map used by the dispatch loop
//! - [`HandlerHandle`] - returned on registration, toggles execution mode
//!   and removes the handler
//!
//! # Example
//!
//! ```ignore
//! let handle = conn.on_message(|conn, _frame_type, payload| async move {
//!     let hello: Hello = payload.decode()?;
//!     conn.write_json(&hello).await
//! });
//!
//! // run on its own task from now on
//! handle.set_async(true);
//!
//! // and later
//! handle.delete();
//! ```
//!
//! Handlers are only registered through a connection:
//!
//! ```compile_fail
//! use wsdispatch::handler::Callback;
//! ```

mod payload;
mod registry;

pub use payload::{Payload, PayloadReader};
pub(crate) use registry::HandlerRegistry;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::{Buf, Bytes, BytesMut};

use crate::connection::{Connection, ConnectionInner};
use crate::error::Result;
use crate::protocol::FrameType;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type PayloadFn = dyn Fn(Connection, FrameType, Payload) -> BoxFuture<'static, HandlerResult>
    + Send
    + Sync;
type BufferFn = dyn Fn(Connection, FrameType, BytesMut) -> BoxFuture<'static, HandlerResult>
    + Send
    + Sync;
type ReaderFn = dyn Fn(Connection, FrameType, PayloadReader) -> BoxFuture<'static, HandlerResult>
    + Send
    + Sync;

/// Handler callback, tagged by how it wants the frame materialized.
pub(crate) enum Callback {
    /// Receives a shared, immutable [`Payload`].
    Payload(Box<PayloadFn>),
    /// Receives an owned, mutable copy of the frame.
    Buffer(Box<BufferFn>),
    /// Receives a streaming `std::io::Read` view.
    Reader(Box<ReaderFn>),
}

impl Callback {
    /// Wrap a payload handler.
    pub(crate) fn payload<F, Fut>(f: F) -> Self
    where
        F: Fn(Connection, FrameType, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Callback::Payload(Box::new(move |conn, frame_type, payload| {
            Box::pin(f(conn, frame_type, payload))
        }))
    }

    /// Wrap a buffer handler.
    pub(crate) fn buffer<F, Fut>(f: F) -> Self
    where
        F: Fn(Connection, FrameType, BytesMut) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Callback::Buffer(Box::new(move |conn, frame_type, buffer| {
            Box::pin(f(conn, frame_type, buffer))
        }))
    }

    /// Wrap a reader handler.
    pub(crate) fn reader<F, Fut>(f: F) -> Self
    where
        F: Fn(Connection, FrameType, PayloadReader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Callback::Reader(Box::new(move |conn, frame_type, reader| {
            Box::pin(f(conn, frame_type, reader))
        }))
    }

    fn kind(&self) -> &'static str {
        match self {
            Callback::Payload(_) => "payload",
            Callback::Buffer(_) => "buffer",
            Callback::Reader(_) => "reader",
        }
    }

    fn call(
        &self,
        conn: Connection,
        frame_type: FrameType,
        data: &Bytes,
    ) -> BoxFuture<'static, HandlerResult> {
        match self {
            Callback::Payload(f) => f(conn, frame_type, Payload::new(data.clone())),
            Callback::Buffer(f) => f(conn, frame_type, BytesMut::from(&data[..])),
            Callback::Reader(f) => f(conn, frame_type, data.clone().reader()),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback::{}", self.kind())
    }
}

/// A registered message handler.
pub(crate) struct Handler {
    id: u64,
    is_async: AtomicBool,
    callback: Callback,
    /// Only used for self-removal; never keeps the connection alive.
    conn: Weak<ConnectionInner>,
}

impl Handler {
    pub(crate) fn new(
        id: u64,
        callback: Callback,
        is_async: bool,
        conn: Weak<ConnectionInner>,
    ) -> Self {
        Self {
            id,
            is_async: AtomicBool::new(is_async),
            callback,
            conn,
        }
    }

    /// Identifier, unique for the lifetime of the connection.
    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Whether the handler runs on its own task.
    #[inline]
    pub(crate) fn is_async(&self) -> bool {
        self.is_async.load(Ordering::Acquire)
    }

    /// Build the handler future for one frame.
    pub(crate) fn call(
        &self,
        conn: Connection,
        frame_type: FrameType,
        data: &Bytes,
    ) -> BoxFuture<'static, HandlerResult> {
        self.callback.call(conn, frame_type, data)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("is_async", &self.is_async())
            .field("callback", &self.callback)
            .finish()
    }
}

/// Handle to a registered handler.
///
/// Dropping the handle does not unregister the handler.
#[derive(Debug, Clone)]
pub struct HandlerHandle {
    handler: Arc<Handler>,
}

impl HandlerHandle {
    pub(crate) fn new(handler: Arc<Handler>) -> Self {
        Self { handler }
    }

    /// Handler identifier.
    #[inline]
    pub fn id(&self) -> u64 {
        self.handler.id
    }

    /// Switch between inline (`false`) and spawned (`true`) execution.
    ///
    /// Takes effect from the next dispatched frame.
    pub fn set_async(&self, is_async: bool) {
        self.handler.is_async.store(is_async, Ordering::Release);
    }

    /// Whether the handler runs on its own task.
    pub fn is_async(&self) -> bool {
        self.handler.is_async()
    }

    /// Remove the handler from its connection.
    ///
    /// Returns `false` if it was already removed or the connection is gone.
    pub fn delete(&self) -> bool {
        match self.handler.conn.upgrade() {
            Some(conn) => conn.registry.remove(self.handler.id),
            None => false,
        }
    }
}
