//! Shared test utilities: a scripted in-memory transport.
//!
//! [`MockTransport::new`] returns the transport and a [`MockPeer`]. The peer
//! feeds read outcomes to the connection and records everything the
//! connection writes. Dropping the peer (or calling [`MockPeer::vanish`])
//! makes the next read report a disconnect.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::handler::BoxFuture;
use crate::protocol::{CloseCode, FrameType, Inbound};
use crate::transport::{FrameReader, FrameWriter, Transport};

#[derive(Default)]
struct Recorded {
    writes: Mutex<Vec<(FrameType, Bytes)>>,
    closes: Mutex<Vec<(CloseCode, String)>>,
    shutdowns: AtomicUsize,
    fail_writes: AtomicBool,
}

pub(crate) struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Result<Inbound>>,
    recorded: Arc<Recorded>,
}

impl MockTransport {
    pub(crate) fn new() -> (MockTransport, MockPeer) {
        let (tx, inbound) = mpsc::unbounded_channel();
        let recorded = Arc::new(Recorded::default());
        (
            MockTransport {
                inbound,
                recorded: recorded.clone(),
            },
            MockPeer {
                tx: Some(tx),
                recorded,
            },
        )
    }
}

impl Transport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn split(self) -> (MockReader, MockWriter) {
        (
            MockReader {
                inbound: self.inbound,
            },
            MockWriter {
                recorded: self.recorded,
            },
        )
    }
}

pub(crate) struct MockReader {
    inbound: mpsc::UnboundedReceiver<Result<Inbound>>,
}

impl FrameReader for MockReader {
    fn read_frame(&mut self) -> BoxFuture<'_, Result<Inbound>> {
        Box::pin(async move {
            match self.inbound.recv().await {
                Some(outcome) => outcome,
                None => Err(Error::Disconnected),
            }
        })
    }
}

pub(crate) struct MockWriter {
    recorded: Arc<Recorded>,
}

impl FrameWriter for MockWriter {
    fn write_frame(&mut self, frame_type: FrameType, payload: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.recorded.fail_writes.load(Ordering::Acquire) {
                return Err(Error::Transport("write failed".to_string()));
            }
            self.recorded
                .writes
                .lock()
                .unwrap()
                .push((frame_type, payload));
            Ok(())
        })
    }

    fn close(&mut self, code: CloseCode, reason: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.recorded.closes.lock().unwrap().push((code, reason));
            Ok(())
        })
    }

    fn shutdown(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.recorded.shutdowns.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    }
}

/// Remote end of a [`MockTransport`].
pub(crate) struct MockPeer {
    tx: Option<mpsc::UnboundedSender<Result<Inbound>>>,
    recorded: Arc<Recorded>,
}

impl MockPeer {
    fn push(&self, outcome: Result<Inbound>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(outcome);
        }
    }

    pub(crate) fn send_text(&self, text: &str) {
        self.push(Ok(Inbound::Frame(
            FrameType::Text,
            Bytes::copy_from_slice(text.as_bytes()),
        )));
    }

    pub(crate) fn send_binary(&self, data: &[u8]) {
        self.push(Ok(Inbound::Frame(
            FrameType::Binary,
            Bytes::copy_from_slice(data),
        )));
    }

    pub(crate) fn send_close(&self, code: CloseCode, reason: &str) {
        self.push(Ok(Inbound::close(code, reason)));
    }

    pub(crate) fn send_error(&self, error: Error) {
        self.push(Err(error));
    }

    /// Drop the inbound side without a close signal.
    pub(crate) fn vanish(&mut self) {
        self.tx = None;
    }

    pub(crate) fn fail_writes(&self) {
        self.recorded.fail_writes.store(true, Ordering::Release);
    }

    pub(crate) fn writes(&self) -> Vec<(FrameType, Bytes)> {
        self.recorded.writes.lock().unwrap().clone()
    }

    pub(crate) fn closes(&self) -> Vec<(CloseCode, String)> {
        self.recorded.closes.lock().unwrap().clone()
    }

    pub(crate) fn shutdowns(&self) -> usize {
        self.recorded.shutdowns.load(Ordering::Acquire)
    }
}
