//! gRPC transport.
//!
//! Opens the bidirectional `ChatService/Chat` call and adapts its protobuf
//! messages to the core's frames.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{OnceCell, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, error, info, warn};

use qstream_core::config::Config;
use qstream_core::transport::{DuplexChannel, Transport, TransportError};
use qstream_core::{InboundEvent, OutboundFrame, SessionIdentity};
use qstream_proto::methods::CHAT_PATH;
use qstream_proto::v1::{
    ChatInput, ChatOutput, EndOfInputEvent, TextInputEvent, chat_input, chat_output,
};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Backend address, `http://` or `https://`.
    pub endpoint: String,
    pub connect_timeout: Duration,
    /// Bearer token sent as `authorization`.
    pub auth_token: Option<String>,
    /// Custom CA certificate for TLS endpoints.
    pub ca_cert: Option<PathBuf>,
    pub outbound_capacity: usize,
    pub inbound_capacity: usize,
}

impl ConnectionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.connection.endpoint.clone(),
            connect_timeout: Duration::from_secs(config.connection.connect_timeout_secs),
            auth_token: config.connection.auth_token.clone(),
            ca_cert: config.connection.ca_cert.clone(),
            outbound_capacity: config.session.outbound_capacity.max(1),
            inbound_capacity: config.session.inbound_capacity.max(1),
        }
    }

    pub fn is_tls(&self) -> bool {
        self.endpoint.starts_with("https://")
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Connection errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("TLS config error: {0}")]
    Tls(String),

    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("RPC call failed: {0}")]
    RpcFailed(String),
}

impl From<ConnectionError> for TransportError {
    fn from(e: ConnectionError) -> Self {
        Self::Connect(e.to_string())
    }
}

/// Header value restricted to printable ASCII; anything else is an error.
fn ascii_header_value(key: &str, value: &str) -> Result<MetadataValue<Ascii>, ConnectionError> {
    let invalid = || ConnectionError::RpcFailed(format!("{key} is not a valid header value"));
    if !value.bytes().all(|b| (b' '..=b'~').contains(&b)) {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}

/// Attach the session identity and optional bearer token to a request.
fn apply_session_meta<T>(
    req: &mut tonic::Request<T>,
    identity: &SessionIdentity,
    auth_token: Option<&str>,
) -> Result<(), ConnectionError> {
    let headers = [
        ("x-qstream-account", identity.account()),
        ("x-qstream-application", identity.application()),
        ("x-qstream-user", identity.user()),
    ];
    for (key, value) in headers {
        let val = ascii_header_value(key, value)?;
        req.metadata_mut().insert(key, val);
    }
    if let Some(token) = auth_token {
        let val = ascii_header_value("authorization", &format!("Bearer {token}"))?;
        req.metadata_mut().insert("authorization", val);
    }
    Ok(())
}

/// Client frame to wire message.
pub fn frame_to_input(frame: OutboundFrame) -> ChatInput {
    match frame {
        OutboundFrame::Event(event) => ChatInput {
            event: Some(chat_input::Event::Text(TextInputEvent {
                user_message: event.payload,
            })),
            sequence: event.sequence,
        },
        OutboundFrame::EndOfInput => ChatInput {
            event: Some(chat_input::Event::EndOfInput(EndOfInputEvent {})),
            sequence: 0,
        },
    }
}

/// Wire message to backend event. Non-empty message ids are folded into the
/// metadata entries; free-form entries follow in key order.
pub fn output_to_event(output: ChatOutput) -> Result<InboundEvent, TransportError> {
    let event = output
        .event
        .ok_or_else(|| TransportError::Malformed("chat output without event".into()))?;

    Ok(match event {
        chat_output::Event::Text(text) => InboundEvent::Content(text.system_message),
        chat_output::Event::Metadata(meta) => {
            let mut entries: Vec<(String, String)> = [
                ("conversation_id", meta.conversation_id),
                ("user_message_id", meta.user_message_id),
                ("system_message_id", meta.system_message_id),
            ]
            .into_iter()
            .filter(|(_, id)| !id.is_empty())
            .map(|(key, id)| (key.to_string(), id))
            .collect();

            let mut extra: Vec<_> = meta.entries.into_iter().collect();
            extra.sort();
            entries.extend(extra);
            InboundEvent::Metadata(entries)
        }
        chat_output::Event::Terminal(_) => InboundEvent::Terminal,
        chat_output::Event::Error(err) => InboundEvent::error(err.code, err.message),
    })
}

/// Transport over a lazily connected gRPC channel. The channel is shared by
/// every session opened through this transport.
pub struct GrpcTransport {
    config: ConnectionConfig,
    channel: OnceCell<Channel>,
}

impl GrpcTransport {
    /// Create a transport (not yet connected).
    pub const fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            channel: OnceCell::const_new(),
        }
    }

    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn channel(&self) -> Result<Channel, ConnectionError> {
        self.channel
            .get_or_try_init(|| self.connect())
            .await
            .cloned()
    }

    async fn connect(&self) -> Result<Channel, ConnectionError> {
        let mut endpoint = Endpoint::from_shared(self.config.endpoint.clone())
            .map_err(|e| ConnectionError::InvalidAddress(e.to_string()))?
            .connect_timeout(self.config.connect_timeout)
            .http2_keep_alive_interval(Duration::from_secs(30))
            .keep_alive_timeout(Duration::from_secs(10));

        if self.config.is_tls() {
            let mut tls_config = ClientTlsConfig::new().with_enabled_roots();
            if let Some(ca_path) = &self.config.ca_cert {
                let ca_pem = std::fs::read_to_string(ca_path).map_err(|e| {
                    ConnectionError::Tls(format!(
                        "Failed to read CA cert {}: {}",
                        ca_path.display(),
                        e
                    ))
                })?;
                tls_config = tls_config.ca_certificate(Certificate::from_pem(ca_pem));
            }
            endpoint = endpoint
                .tls_config(tls_config)
                .map_err(|e| ConnectionError::Tls(e.to_string()))?;
        }

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ConnectionError::ConnectFailed(e.to_string()))?;
        info!(endpoint = %self.config.endpoint, tls = self.config.is_tls(), "Connected");
        Ok(channel)
    }
}

impl Transport for GrpcTransport {
    async fn open_channel(
        &self,
        identity: &SessionIdentity,
    ) -> Result<DuplexChannel, TransportError> {
        let channel = self.channel().await?;
        let mut grpc = tonic::client::Grpc::new(channel);
        grpc.ready()
            .await
            .map_err(|e| ConnectionError::ConnectFailed(format!("Service was not ready: {e}")))?;

        // Outgoing frames (client -> backend)
        let (frame_tx, frame_rx) = mpsc::channel::<OutboundFrame>(self.config.outbound_capacity);
        let request_stream = ReceiverStream::new(frame_rx).map(frame_to_input);

        let mut request = tonic::Request::new(request_stream);
        apply_session_meta(&mut request, identity, self.config.auth_token.as_deref())?;

        let codec = tonic_prost::ProstCodec::<ChatInput, ChatOutput>::default();
        let response = grpc
            .streaming(request, PathAndQuery::from_static(CHAT_PATH), codec)
            .await
            .map_err(|e| ConnectionError::RpcFailed(e.to_string()))?;
        let mut output_stream = response.into_inner();

        // Incoming events (backend -> client)
        let (event_tx, event_rx) = mpsc::channel(self.config.inbound_capacity);
        let stream_handle = tokio::spawn(async move {
            loop {
                match output_stream.message().await {
                    Ok(Some(output)) => {
                        let event = output_to_event(output);
                        let malformed = event.is_err();
                        if event_tx.send(event).await.is_err() {
                            debug!("Event receiver dropped");
                            break;
                        }
                        if malformed {
                            warn!("Malformed chat output, closing stream");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Chat stream ended");
                        break;
                    }
                    Err(status) => {
                        error!(?status, "Chat stream error");
                        let _ = event_tx
                            .send(Err(TransportError::Stream(status.to_string())))
                            .await;
                        break;
                    }
                }
            }
        });

        debug!(%identity, "Chat stream opened");
        Ok(DuplexChannel::new(frame_tx, event_rx).with_task(stream_handle))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use qstream_core::OutboundEvent;
    use qstream_proto::v1::{ErrorEvent, MetadataEvent, TerminalEvent, TextOutputEvent};

    use super::*;

    fn identity() -> SessionIdentity {
        SessionIdentity::new("acct", "app", "alice").unwrap()
    }

    #[test]
    fn default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.endpoint, "http://127.0.0.1:50051");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(!config.is_tls());
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn config_follows_settings() {
        let mut settings = Config::default();
        settings.connection.endpoint = "https://chat.example.com".into();
        settings.connection.auth_token = Some("tok".into());
        settings.session.outbound_capacity = 0;
        let config = ConnectionConfig::from_config(&settings);
        assert!(config.is_tls());
        assert_eq!(config.auth_token.as_deref(), Some("tok"));
        assert_eq!(config.outbound_capacity, 1);
    }

    #[test]
    fn apply_session_meta_adds_headers() {
        let mut req = tonic::Request::new(());
        apply_session_meta(&mut req, &identity(), Some("my-token")).unwrap();
        let header = |name: &str| req.metadata().get(name).unwrap().to_str().unwrap().to_string();
        assert_eq!(header("x-qstream-account"), "acct");
        assert_eq!(header("x-qstream-application"), "app");
        assert_eq!(header("x-qstream-user"), "alice");
        assert_eq!(header("authorization"), "Bearer my-token");
    }

    #[test]
    fn apply_session_meta_skips_missing_token() {
        let mut req = tonic::Request::new(());
        apply_session_meta(&mut req, &identity(), None).unwrap();
        assert!(req.metadata().get("authorization").is_none());
        assert!(req.metadata().get("x-qstream-user").is_some());
    }

    #[test]
    fn non_ascii_identity_is_rejected() {
        let mut req = tonic::Request::new(());
        let identity = SessionIdentity::new("acct", "app", "jürgen").unwrap();
        let err = apply_session_meta(&mut req, &identity, None).unwrap_err();
        assert!(err.to_string().contains("x-qstream-user"));
        assert!(req.metadata().get("x-qstream-user").is_none());
    }

    #[test]
    fn printable_ascii_identity_is_sent_verbatim() {
        let mut req = tonic::Request::new(());
        let identity = SessionIdentity::new("acct-1", "app/v2", "a.b c~d").unwrap();
        apply_session_meta(&mut req, &identity, None).unwrap();
        let user = req.metadata().get("x-qstream-user").unwrap();
        assert_eq!(user.to_str().unwrap(), "a.b c~d");
    }

    #[test]
    fn unusable_auth_token_fails_instead_of_dropping() {
        for token in ["line\nbreak", "tökén"] {
            let mut req = tonic::Request::new(());
            let err = apply_session_meta(&mut req, &identity(), Some(token)).unwrap_err();
            assert!(matches!(err, ConnectionError::RpcFailed(ref m) if m.contains("authorization")));
            assert!(req.metadata().get("authorization").is_none());
        }
    }

    #[test]
    fn text_frame_maps_to_text_input() {
        let input = frame_to_input(OutboundFrame::Event(OutboundEvent {
            sequence: 2,
            payload: "cherry".into(),
        }));
        assert_eq!(input.sequence, 2);
        match input.event {
            Some(chat_input::Event::Text(text)) => assert_eq!(text.user_message, "cherry"),
            other => panic!("expected text input, got {other:?}"),
        }
    }

    #[test]
    fn end_of_input_maps_to_marker() {
        let input = frame_to_input(OutboundFrame::EndOfInput);
        assert!(matches!(input.event, Some(chat_input::Event::EndOfInput(_))));
    }

    #[test]
    fn outputs_map_to_events() {
        let text = ChatOutput {
            event: Some(chat_output::Event::Text(TextOutputEvent {
                system_message: "hi".into(),
            })),
        };
        assert_eq!(output_to_event(text).unwrap(), InboundEvent::content("hi"));

        let terminal = ChatOutput {
            event: Some(chat_output::Event::Terminal(TerminalEvent {})),
        };
        assert_eq!(output_to_event(terminal).unwrap(), InboundEvent::Terminal);

        let error = ChatOutput {
            event: Some(chat_output::Event::Error(ErrorEvent {
                code: "throttled".into(),
                message: "slow down".into(),
            })),
        };
        assert_eq!(
            output_to_event(error).unwrap(),
            InboundEvent::error("throttled", "slow down")
        );
    }

    #[test]
    fn metadata_folds_ids_then_sorted_entries() {
        let output = ChatOutput {
            event: Some(chat_output::Event::Metadata(MetadataEvent {
                conversation_id: "c-1".into(),
                user_message_id: String::new(),
                system_message_id: "s-9".into(),
                entries: HashMap::from([
                    ("tone".to_string(), "dry".to_string()),
                    ("lang".to_string(), "en".to_string()),
                ]),
            })),
        };
        assert_eq!(
            output_to_event(output).unwrap(),
            InboundEvent::metadata([
                ("conversation_id", "c-1"),
                ("system_message_id", "s-9"),
                ("lang", "en"),
                ("tone", "dry"),
            ])
        );
    }

    #[test]
    fn empty_output_is_malformed() {
        let err = output_to_event(ChatOutput { event: None }).unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_connect_error() {
        let transport = GrpcTransport::new(ConnectionConfig {
            endpoint: "not a uri".into(),
            ..ConnectionConfig::default()
        });
        let err = transport.open_channel(&identity()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(ref m) if m.contains("Invalid address")));
    }
}
