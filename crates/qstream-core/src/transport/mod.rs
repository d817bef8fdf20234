//! Transport seam between the protocol core and whatever carries frames.
//!
//! A [`Transport`] opens one [`DuplexChannel`] per session. The channel is
//! split so each direction has a single owner: the pump holds the
//! [`ChannelWriter`], the collector holds the [`ChannelReader`], and the
//! orchestrator holds the [`ChannelGuard`] that tears everything down.

pub mod memory;

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::frame::{InboundEvent, OutboundFrame};
use crate::identity::SessionIdentity;

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Channel closed by peer")]
    Closed,

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Malformed frame: {0}")]
    Malformed(String),
}

/// Opens duplex channels to the chat backend.
pub trait Transport: Send + Sync + 'static {
    fn open_channel(
        &self,
        identity: &SessionIdentity,
    ) -> impl Future<Output = Result<DuplexChannel, TransportError>> + Send;
}

/// An open, not yet split, duplex channel.
#[derive(Debug)]
pub struct DuplexChannel {
    outbound: mpsc::Sender<OutboundFrame>,
    inbound: mpsc::Receiver<Result<InboundEvent, TransportError>>,
    task: Option<JoinHandle<()>>,
}

impl DuplexChannel {
    pub const fn new(
        outbound: mpsc::Sender<OutboundFrame>,
        inbound: mpsc::Receiver<Result<InboundEvent, TransportError>>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            task: None,
        }
    }

    /// Attach a background task (e.g. a stream reader) that must die with the
    /// channel.
    #[must_use]
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn split(self) -> (ChannelWriter, ChannelReader, ChannelGuard) {
        let guard = ChannelGuard {
            keepalive: Some(self.outbound.clone()),
            task: self.task,
        };
        (
            ChannelWriter {
                tx: self.outbound,
            },
            ChannelReader::new(self.inbound),
            guard,
        )
    }
}

/// Outbound half. Writes wait while the transport buffer is full.
#[derive(Debug)]
pub struct ChannelWriter {
    tx: mpsc::Sender<OutboundFrame>,
}

impl ChannelWriter {
    pub const fn new(tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self { tx }
    }

    pub async fn write(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.tx.send(frame).await.map_err(|_| TransportError::Closed)
    }
}

/// Inbound half.
#[derive(Debug)]
pub struct ChannelReader {
    rx: mpsc::Receiver<Result<InboundEvent, TransportError>>,
}

impl ChannelReader {
    pub const fn new(rx: mpsc::Receiver<Result<InboundEvent, TransportError>>) -> Self {
        Self { rx }
    }

    /// Next frame, or `None` once the peer has closed its side.
    pub async fn read(&mut self) -> Option<Result<InboundEvent, TransportError>> {
        self.rx.recv().await
    }

    /// Frame already buffered, without waiting.
    pub fn try_read(&mut self) -> Option<Result<InboundEvent, TransportError>> {
        self.rx.try_recv().ok()
    }
}

/// Keeps the outbound direction open until the session is done with it, and
/// closes the channel when dropped.
#[derive(Debug)]
pub struct ChannelGuard {
    keepalive: Option<mpsc::Sender<OutboundFrame>>,
    task: Option<JoinHandle<()>>,
}

impl ChannelGuard {
    pub fn close(&mut self) {
        let was_open = self.keepalive.take().is_some();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if was_open {
            debug!("Duplex channel closed");
        }
    }

    pub const fn is_closed(&self) -> bool {
        self.keepalive.is_none()
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.close();
    }
}
