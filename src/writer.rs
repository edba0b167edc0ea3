//! Dedicated writer task owning the transport's write half.
//!
//! Writes from any task go through an mpsc channel to a single task instead
//! of sharing the write half behind an `Arc<Mutex<_>>`. Each request carries
//! a oneshot so the caller still sees the transport's result.
//!
//! # Architecture
//!
//! ```text
//! Handler 1 ─┐
//! Handler 2 ─┼─► mpsc::Sender<WriteCommand> ─► Writer Task ─► FrameWriter
//! close()   ─┘
//! ```
//!
//! The bounded channel gives back-pressure: when it is full, writers wait.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::{CloseCode, FrameType};
use crate::transport::FrameWriter;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A request for the writer task.
#[derive(Debug)]
enum WriteCommand {
    Frame {
        frame_type: FrameType,
        payload: Bytes,
        done: oneshot::Sender<Result<()>>,
    },
    Close {
        code: CloseCode,
        reason: String,
        done: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the request queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending requests to the writer task.
///
/// This is cheaply cloneable and can be shared across handlers.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteCommand>,
}

impl WriterHandle {
    /// Send a frame and wait for the transport's result.
    pub async fn write(&self, frame_type: FrameType, payload: Bytes) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.request(
            WriteCommand::Frame {
                frame_type,
                payload,
                done,
            },
            rx,
        )
        .await
    }

    /// Ask the transport to close and wait for its result.
    pub async fn close(&self, code: CloseCode, reason: String) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.request(WriteCommand::Close { code, reason, done }, rx)
            .await
    }

    /// Release the write half and stop the writer task.
    ///
    /// Requests already queued are still processed first.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(WriteCommand::Shutdown).await;
    }

    async fn request(
        &self,
        command: WriteCommand,
        rx: oneshot::Receiver<Result<()>>,
    ) -> Result<()> {
        // Both failures mean the writer task is gone.
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)` where the JoinHandle can be used
/// to wait for the writer task to complete.
pub fn spawn_writer_task<W>(writer: W, config: &WriterConfig) -> (WriterHandle, JoinHandle<()>)
where
    W: FrameWriter,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - one request at a time, in arrival order.
async fn writer_loop<W: FrameWriter>(mut rx: mpsc::Receiver<WriteCommand>, mut writer: W) {
    while let Some(command) = rx.recv().await {
        match command {
            WriteCommand::Frame {
                frame_type,
                payload,
                done,
            } => {
                let result = writer.write_frame(frame_type, payload).await;
                if let Err(e) = &result {
                    tracing::error!("Frame write failed: {}", e);
                }
                let _ = done.send(result);
            }
            WriteCommand::Close { code, reason, done } => {
                let _ = done.send(writer.close(code, reason).await);
            }
            WriteCommand::Shutdown => {
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!("Writer shutdown failed: {}", e);
                }
                return;
            }
        }
    }
}
