//! Named constants for the gRPC method paths of the chat stream.
//!
//! Clients build the request path from these rather than repeating string
//! literals.

/// Fully qualified protobuf service name.
pub const CHAT_SERVICE: &str = "qstream.v1.ChatService";

/// `ChatService/Chat`
pub const METHOD_CHAT: &str = "ChatService/Chat";

/// HTTP/2 path of the bidirectional `Chat` call.
pub const CHAT_PATH: &str = "/qstream.v1.ChatService/Chat";
