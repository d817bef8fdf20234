#![allow(clippy::unwrap_used, clippy::panic)] // Integration tests use unwrap for brevity

//! Full turns over `GrpcTransport` against an in-process tonic server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};

use qstream_cli::connection::{ConnectionConfig, GrpcTransport};
use qstream_core::{EventSource, SessionError, TransportError, prepare_turn};
use qstream_proto::v1::chat_service_server::{ChatService, ChatServiceServer};
use qstream_proto::v1::{
    ChatInput, ChatOutput, ErrorEvent, MetadataEvent, TerminalEvent, TextOutputEvent, chat_input,
    chat_output,
};

const TOKEN: &str = "secret";

type ChatOutputStream = Pin<Box<dyn Stream<Item = Result<ChatOutput, Status>> + Send>>;

/// Collects the turn's text and answers once end-of-input arrives. A message
/// of `"fail"` is answered with a backend error instead.
struct EchoChat;

fn output(event: chat_output::Event) -> Result<ChatOutput, Status> {
    Ok(ChatOutput { event: Some(event) })
}

#[tonic::async_trait]
impl ChatService for EchoChat {
    type ChatStream = ChatOutputStream;

    async fn chat(
        &self,
        request: Request<Streaming<ChatInput>>,
    ) -> Result<Response<Self::ChatStream>, Status> {
        let header = |name: &str| {
            request
                .metadata()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        if header("authorization") != Some(format!("Bearer {TOKEN}")) {
            return Err(Status::unauthenticated("bad token"));
        }
        let user = header("x-qstream-user").unwrap_or_default();

        let mut in_stream = request.into_inner();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut words = Vec::new();
            let mut sequences = Vec::new();
            while let Some(Ok(input)) = in_stream.next().await {
                match input.event {
                    Some(chat_input::Event::Text(text)) if text.user_message == "fail" => {
                        let _ = tx
                            .send(output(chat_output::Event::Error(ErrorEvent {
                                code: "throttled".into(),
                                message: "slow down".into(),
                            })))
                            .await;
                        return;
                    }
                    Some(chat_input::Event::Text(text)) => {
                        words.push(text.user_message);
                        sequences.push(input.sequence.to_string());
                    }
                    Some(chat_input::Event::EndOfInput(_)) => {
                        let answers = [
                            chat_output::Event::Text(TextOutputEvent {
                                system_message: format!("echo: {}", words.join(" ")),
                            }),
                            chat_output::Event::Metadata(MetadataEvent {
                                conversation_id: "conv-1".into(),
                                user_message_id: String::new(),
                                system_message_id: "sys-1".into(),
                                entries: HashMap::from([
                                    ("user".to_string(), user.clone()),
                                    ("sequences".to_string(), sequences.join(",")),
                                ]),
                            }),
                            chat_output::Event::Terminal(TerminalEvent {}),
                        ];
                        for answer in answers {
                            if tx.send(output(answer)).await.is_err() {
                                return;
                            }
                        }
                    }
                    None => {
                        let _ = tx.send(Err(Status::invalid_argument("empty input"))).await;
                        return;
                    }
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

async fn serve() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(ChatServiceServer::new(EchoChat))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr
}

fn transport(addr: SocketAddr, token: &str) -> Arc<GrpcTransport> {
    Arc::new(GrpcTransport::new(ConnectionConfig {
        endpoint: format!("http://{addr}"),
        auth_token: Some(token.into()),
        ..ConnectionConfig::default()
    }))
}

#[tokio::test]
async fn turn_round_trips_through_grpc() {
    let addr = serve().await;
    let turn = prepare_turn(transport(addr, TOKEN), "acct", "app", "alice").unwrap();

    let result = turn
        .send_source(EventSource::from_values(["apple", "banana", "cherry"]))
        .await
        .unwrap();

    assert!(result.is_completed());
    assert_eq!(result.text(), "echo: apple banana cherry");
    assert_eq!(result.metadata["conversation_id"], "conv-1");
    assert_eq!(result.metadata["system_message_id"], "sys-1");
    assert!(!result.metadata.contains_key("user_message_id"));
    assert_eq!(result.metadata["user"], "alice");
    assert_eq!(result.metadata["sequences"], "0,1,2");
}

#[tokio::test]
async fn shared_channel_serves_consecutive_turns() {
    let addr = serve().await;
    let turn = prepare_turn(transport(addr, TOKEN), "acct", "app", "bob").unwrap();

    let first = turn
        .send_source(EventSource::from_values(["one"]))
        .await
        .unwrap();
    let second = turn
        .send_source(EventSource::from_values(["two", "three"]))
        .await
        .unwrap();

    assert_eq!(first.text(), "echo: one");
    assert_eq!(second.text(), "echo: two three");
}

#[tokio::test]
async fn backend_error_frame_aborts_turn() {
    let addr = serve().await;
    let turn = prepare_turn(transport(addr, TOKEN), "acct", "app", "alice").unwrap();

    let err = turn
        .send_source(EventSource::from_values(["apple", "fail"]))
        .await
        .unwrap_err();

    let backend = err.backend_error().unwrap();
    assert_eq!(backend.code, "throttled");
    assert_eq!(backend.message, "slow down");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn rejected_call_is_connection_error() {
    let addr = serve().await;
    let turn = prepare_turn(transport(addr, "wrong"), "acct", "app", "alice").unwrap();

    let err = turn
        .send_source(EventSource::from_values(["apple"]))
        .await
        .unwrap_err();

    match err {
        SessionError::Connection(TransportError::Connect(message)) => {
            assert!(message.contains("bad token"), "{message}");
        }
        other => panic!("expected connection error, got {other:?}"),
    }
}
