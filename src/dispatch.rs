//! Per-connection read and dispatch loop.
//!
//! One loop per connection reads frames in order and hands each one to every
//! registered handler, in ascending id order. Inline handlers are awaited
//! before the next handler runs; async handlers are spawned, bounded by a
//! semaphore. The loop is the only place the close callback is invoked, so
//! it fires at most once.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::{watch, Semaphore};

use crate::connection::{CloseSignal, Connection};
use crate::error::Error;
use crate::handler::Handler;
use crate::protocol::{CloseCode, FrameType, Inbound};
use crate::transport::FrameReader;

/// Reason reported when the peer vanishes without a close handshake.
pub(crate) const SUDDEN_CLOSE_REASON: &str = "the connection was suddenly closed";

pub(crate) async fn run<R: FrameReader>(
    conn: Connection,
    mut reader: R,
    mut shutdown: watch::Receiver<CloseSignal>,
    permits: Arc<Semaphore>,
) {
    tracing::debug!(id = %conn.id(), "Dispatch loop started");

    loop {
        let outcome = tokio::select! {
            biased;

            Ok(()) = shutdown.changed() => {
                closed_locally(&conn, &shutdown);
                break;
            }
            outcome = reader.read_frame() => outcome,
        };

        match outcome {
            Ok(Inbound::Frame(frame_type, data)) => {
                if !dispatch(&conn, frame_type, data, &permits, &mut shutdown).await {
                    closed_locally(&conn, &shutdown);
                    break;
                }
            }
            Ok(Inbound::Close { code, reason }) => {
                conn.mark_closed();
                tracing::debug!(id = %conn.id(), %code, %reason, "Peer closed connection");
                notify_close(&conn, code, &reason);
                break;
            }
            Err(Error::Disconnected) => {
                conn.mark_closed();
                tracing::debug!(id = %conn.id(), "Peer disconnected");
                notify_close(&conn, CloseCode::ABNORMAL, SUDDEN_CLOSE_REASON);
                break;
            }
            Err(e) => {
                let first = conn.mark_closed();
                tracing::error!(id = %conn.id(), "Read failed: {}", e);
                notify_error(&conn, &e);
                if first {
                    if let Err(e) = conn
                        .writer()
                        .close(CloseCode::INTERNAL_ERROR, String::new())
                        .await
                    {
                        tracing::debug!(id = %conn.id(), "Close after read error failed: {}", e);
                    }
                }
                break;
            }
        }
    }

    conn.writer().shutdown().await;
    tracing::debug!(id = %conn.id(), "Dispatch loop stopped");
}

/// Route a `close()` call observed by the loop to the close callback.
fn closed_locally(conn: &Connection, shutdown: &watch::Receiver<CloseSignal>) {
    let (code, reason) = shutdown
        .borrow()
        .clone()
        .unwrap_or((CloseCode::NORMAL, String::new()));
    tracing::debug!(id = %conn.id(), %code, "Connection closed locally");
    notify_close(conn, code, &reason);
}

/// Offer one frame to a snapshot of the registered handlers.
///
/// Handlers registered or removed while this runs take effect from the
/// next frame. Waiting for an async handler permit gives way to `close()`;
/// returns `false` when that happened.
async fn dispatch(
    conn: &Connection,
    frame_type: FrameType,
    data: Bytes,
    permits: &Arc<Semaphore>,
    shutdown: &mut watch::Receiver<CloseSignal>,
) -> bool {
    if conn.registry().is_empty() {
        tracing::trace!(id = %conn.id(), %frame_type, "No message handlers, frame discarded");
        return true;
    }

    for handler in conn.registry().snapshot() {
        if handler.is_async() {
            let permit = tokio::select! {
                biased;

                Ok(()) = shutdown.changed() => return false,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return true,
                },
            };
            let task = invoke(handler, conn.clone(), frame_type, data.clone());
            tokio::spawn(async move {
                task.await;
                drop(permit);
            });
        } else {
            invoke(handler, conn.clone(), frame_type, data.clone()).await;
        }
    }
    true
}

/// Run one handler, containing its errors and panics.
async fn invoke(handler: Arc<Handler>, conn: Connection, frame_type: FrameType, data: Bytes) {
    let id = handler.id();

    let future = match panic::catch_unwind(AssertUnwindSafe(|| {
        handler.call(conn, frame_type, &data)
    })) {
        Ok(future) => future,
        Err(_) => {
            tracing::warn!(handler = id, "Message handler panicked");
            return;
        }
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(handler = id, "Message handler failed: {}", e),
        Err(_) => tracing::warn!(handler = id, "Message handler panicked"),
    }
}

fn notify_close(conn: &Connection, code: CloseCode, reason: &str) {
    let Some(on_close) = conn.close_handler() else {
        return;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| on_close(conn, code, reason))).is_err() {
        tracing::warn!(id = %conn.id(), "Close handler panicked");
    }
}

fn notify_error(conn: &Connection, error: &Error) {
    let Some(on_error) = conn.error_handler() else {
        return;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| on_error(conn, error))).is_err() {
        tracing::warn!(id = %conn.id(), "Error handler panicked");
    }
}
