//! Amazon Q Business transport.
//!
//! Drives the `Chat` event-stream operation. Text frames become
//! `TextInputEvent`s, end-of-input becomes `EndOfInputEvent`; the output
//! stream's text and metadata events come back as content and metadata.
//! The operation has no terminal event, so a cleanly ended output stream is
//! the terminal marker.

use aws_config::BehaviorVersion;
use aws_sdk_qbusiness::Client;
use aws_sdk_qbusiness::error::DisplayErrorContext;
use aws_sdk_qbusiness::primitives::event_stream::EventStreamSender;
use aws_sdk_qbusiness::types::error::ChatInputStreamError;
use aws_sdk_qbusiness::types::{ChatInputStream, ChatOutputStream, EndOfInputEvent, TextInputEvent};
use tokio::sync::{OnceCell, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use qstream_core::config::Config;
use qstream_core::transport::{DuplexChannel, Transport, TransportError};
use qstream_core::{InboundEvent, OutboundFrame, SessionIdentity};

/// Client frame to Q Business input event.
pub fn frame_to_chat_input(frame: OutboundFrame) -> Result<ChatInputStream, ChatInputStreamError> {
    match frame {
        OutboundFrame::Event(event) => TextInputEvent::builder()
            .user_message(event.payload)
            .build()
            .map(ChatInputStream::TextEvent)
            .map_err(ChatInputStreamError::unhandled),
        OutboundFrame::EndOfInput => Ok(ChatInputStream::EndOfInputEvent(
            EndOfInputEvent::builder().build(),
        )),
    }
}

/// Q Business output event to backend event. Events with no counterpart
/// (action reviews, auth challenges, failed attachments) yield `None`.
pub fn output_to_event(output: ChatOutputStream) -> Option<InboundEvent> {
    match output {
        ChatOutputStream::TextEvent(text) => {
            Some(InboundEvent::Content(text.system_message.unwrap_or_default()))
        }
        ChatOutputStream::MetadataEvent(meta) => Some(InboundEvent::Metadata(
            [
                ("conversation_id", meta.conversation_id),
                ("user_message_id", meta.user_message_id),
                ("system_message_id", meta.system_message_id),
            ]
            .into_iter()
            .filter_map(|(key, id)| id.map(|id| (key.to_string(), id)))
            .collect(),
        )),
        other => {
            debug!(?other, "Ignoring Q Business output event");
            None
        }
    }
}

/// Transport over the Q Business `Chat` operation. The SDK client is loaded
/// from the standard AWS environment on first use and shared afterwards.
pub struct QBusinessTransport {
    client: OnceCell<Client>,
    outbound_capacity: usize,
    inbound_capacity: usize,
}

impl QBusinessTransport {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client: OnceCell::new(),
            outbound_capacity: config.session.outbound_capacity.max(1),
            inbound_capacity: config.session.inbound_capacity.max(1),
        }
    }

    /// Use an already configured SDK client.
    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client: OnceCell::new_with(Some(client)),
            ..Self::from_config(config)
        }
    }

    async fn client(&self) -> Client {
        self.client
            .get_or_init(|| async {
                let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
                info!(region = ?sdk_config.region(), "Loaded AWS configuration");
                Client::new(&sdk_config)
            })
            .await
            .clone()
    }
}

impl Transport for QBusinessTransport {
    async fn open_channel(
        &self,
        identity: &SessionIdentity,
    ) -> Result<DuplexChannel, TransportError> {
        let client = self.client().await;

        // Outgoing frames (client -> backend)
        let (frame_tx, frame_rx) = mpsc::channel::<OutboundFrame>(self.outbound_capacity);
        let input = EventStreamSender::from(ReceiverStream::new(frame_rx).map(frame_to_chat_input));

        let request = client
            .chat()
            .application_id(identity.application())
            .user_id(identity.user())
            .input_stream(input);

        // The account is carried by the AWS credentials, not the request.
        debug!(account = identity.account(), "Opening Q Business chat stream");

        // The initial response may wait for input, so the call runs alongside
        // the pump instead of before it. A failed call surfaces as the first
        // inbound item.
        let (event_tx, event_rx) = mpsc::channel(self.inbound_capacity);
        let stream_handle = tokio::spawn(async move {
            let mut output_stream = match request.send().await {
                Ok(output) => output.output_stream,
                Err(e) => {
                    error!(error = %DisplayErrorContext(&e), "Q Business chat call failed");
                    let _ = event_tx
                        .send(Err(TransportError::Connect(
                            DisplayErrorContext(&e).to_string(),
                        )))
                        .await;
                    return;
                }
            };

            loop {
                match output_stream.recv().await {
                    Ok(Some(output)) => {
                        let Some(event) = output_to_event(output) else {
                            continue;
                        };
                        if event_tx.send(Ok(event)).await.is_err() {
                            debug!("Event receiver dropped");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Q Business output stream ended");
                        let _ = event_tx.send(Ok(InboundEvent::Terminal)).await;
                        break;
                    }
                    Err(e) => {
                        warn!(error = %DisplayErrorContext(&e), "Q Business output stream error");
                        let _ = event_tx
                            .send(Err(TransportError::Stream(
                                DisplayErrorContext(&e).to_string(),
                            )))
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(DuplexChannel::new(frame_tx, event_rx).with_task(stream_handle))
    }
}
