//! In-process transport.
//!
//! Every opened channel is handed, backend side first, to a listener. Tests
//! script the backend by hand; the demo binary runs [`spawn_echo_backend`].

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{DuplexChannel, Transport, TransportError};
use crate::config::SessionConfig;
use crate::frame::{InboundEvent, OutboundFrame};
use crate::identity::SessionIdentity;

/// Backend end of an in-memory duplex channel.
#[derive(Debug)]
pub struct BackendChannel {
    pub identity: SessionIdentity,
    frames: mpsc::Receiver<OutboundFrame>,
    events: mpsc::Sender<Result<InboundEvent, TransportError>>,
}

impl BackendChannel {
    /// Next client frame; `None` once the client closed the channel.
    pub async fn recv_frame(&mut self) -> Option<OutboundFrame> {
        self.frames.recv().await
    }

    /// Send an event to the client. Returns `false` if nobody is reading.
    pub async fn send_event(&self, event: InboundEvent) -> bool {
        self.events.send(Ok(event)).await.is_ok()
    }

    /// Deliver a transport-level read failure to the client.
    pub async fn fail(&self, error: TransportError) -> bool {
        self.events.send(Err(error)).await.is_ok()
    }

    /// Resolves once the client has stopped reading.
    pub async fn client_gone(&self) {
        self.events.closed().await;
    }

    pub fn is_client_gone(&self) -> bool {
        self.events.is_closed()
    }
}

#[derive(Debug, Clone)]
enum Mode {
    Listening(mpsc::Sender<BackendChannel>),
    Refusing(String),
}

/// Transport whose backend lives in the same process.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    mode: Mode,
    outbound_capacity: usize,
    inbound_capacity: usize,
}

impl MemoryTransport {
    /// Create a transport and the listener its backend channels arrive on.
    pub fn new() -> (Self, mpsc::Receiver<BackendChannel>) {
        Self::with_config(&SessionConfig::default())
    }

    pub fn with_config(config: &SessionConfig) -> (Self, mpsc::Receiver<BackendChannel>) {
        let (tx, rx) = mpsc::channel(16);
        let transport = Self {
            mode: Mode::Listening(tx),
            outbound_capacity: config.outbound_capacity.max(1),
            inbound_capacity: config.inbound_capacity.max(1),
        };
        (transport, rx)
    }

    /// A transport that fails every `open_channel` with `reason`.
    pub fn refusing(reason: impl Into<String>) -> Self {
        let defaults = SessionConfig::default();
        Self {
            mode: Mode::Refusing(reason.into()),
            outbound_capacity: defaults.outbound_capacity,
            inbound_capacity: defaults.inbound_capacity,
        }
    }
}

impl Transport for MemoryTransport {
    async fn open_channel(
        &self,
        identity: &SessionIdentity,
    ) -> Result<DuplexChannel, TransportError> {
        let listener = match &self.mode {
            Mode::Listening(listener) => listener,
            Mode::Refusing(reason) => return Err(TransportError::Connect(reason.clone())),
        };

        let (frame_tx, frame_rx) = mpsc::channel(self.outbound_capacity);
        let (event_tx, event_rx) = mpsc::channel(self.inbound_capacity);
        let backend = BackendChannel {
            identity: identity.clone(),
            frames: frame_rx,
            events: event_tx,
        };
        listener
            .send(backend)
            .await
            .map_err(|_| TransportError::Connect("no backend listening".into()))?;

        debug!(%identity, "In-memory channel opened");
        Ok(DuplexChannel::new(frame_tx, event_rx))
    }
}

/// Answer every text event with a content fragment echoing it, then finish
/// with metadata and a terminal marker once end-of-input arrives.
pub fn spawn_echo_backend(mut listener: mpsc::Receiver<BackendChannel>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut conversations: u64 = 0;
        while let Some(backend) = listener.recv().await {
            conversations += 1;
            tokio::spawn(echo_conversation(backend, conversations));
        }
        info!(conversations, "Echo backend stopped");
    })
}

async fn echo_conversation(mut backend: BackendChannel, conversation: u64) {
    let mut echoed = 0_u64;
    while let Some(frame) = backend.recv_frame().await {
        match frame {
            OutboundFrame::Event(event) => {
                let text = if echoed == 0 {
                    format!("echo: {}", event.payload)
                } else {
                    format!(" {}", event.payload)
                };
                echoed += 1;
                if !backend.send_event(InboundEvent::Content(text)).await {
                    return;
                }
            }
            OutboundFrame::EndOfInput => {
                let metadata = InboundEvent::metadata([
                    ("conversation_id".to_string(), format!("echo-{conversation}")),
                    ("user".to_string(), backend.identity.user().to_string()),
                    ("echoed".to_string(), echoed.to_string()),
                ]);
                if backend.send_event(metadata).await {
                    backend.send_event(InboundEvent::Terminal).await;
                }
                return;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::frame::OutboundEvent;

    fn identity() -> SessionIdentity {
        SessionIdentity::new("acct", "app", "user").unwrap()
    }

    #[tokio::test]
    async fn open_channel_hands_backend_to_listener() {
        let (transport, mut listener) = MemoryTransport::new();
        let channel = transport.open_channel(&identity()).await.unwrap();
        let mut backend = listener.recv().await.unwrap();
        assert_eq!(backend.identity, identity());

        let (writer, mut reader, _guard) = channel.split();
        writer.write(OutboundFrame::EndOfInput).await.unwrap();
        assert_eq!(backend.recv_frame().await, Some(OutboundFrame::EndOfInput));

        assert!(backend.send_event(InboundEvent::Terminal).await);
        assert_eq!(reader.read().await.unwrap().unwrap(), InboundEvent::Terminal);
    }

    #[tokio::test]
    async fn refusing_transport_fails_to_connect() {
        let transport = MemoryTransport::refusing("backend unavailable");
        let err = transport.open_channel(&identity()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(ref r) if r == "backend unavailable"));
    }

    #[tokio::test]
    async fn dropped_listener_is_connect_error() {
        let (transport, listener) = MemoryTransport::new();
        drop(listener);
        let err = transport.open_channel(&identity()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }

    #[tokio::test]
    async fn echo_backend_replies_and_terminates() {
        let (transport, listener) = MemoryTransport::new();
        let _backend = spawn_echo_backend(listener);
        let (writer, mut reader, _guard) =
            transport.open_channel(&identity()).await.unwrap().split();

        for (sequence, payload) in ["apple", "banana"].into_iter().enumerate() {
            writer
                .write(OutboundFrame::Event(OutboundEvent {
                    sequence: sequence as u64,
                    payload: payload.into(),
                }))
                .await
                .unwrap();
        }
        writer.write(OutboundFrame::EndOfInput).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = reader.read().await {
            let event = event.unwrap();
            let done = event == InboundEvent::Terminal;
            events.push(event);
            if done {
                break;
            }
        }
        assert_eq!(events[0], InboundEvent::content("echo: apple"));
        assert_eq!(events[1], InboundEvent::content(" banana"));
        assert!(matches!(events[2], InboundEvent::Metadata(_)));
        assert_eq!(events[3], InboundEvent::Terminal);
    }
}
