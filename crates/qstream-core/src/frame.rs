//! Frames exchanged over the duplex channel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One caller payload, numbered by the pump at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    /// Gapless, starting at 0 for every session.
    pub sequence: u64,
    pub payload: String,
}

/// Client-to-backend frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Event(OutboundEvent),
    /// Written exactly once, after the last event.
    EndOfInput,
}

impl OutboundFrame {
    pub const fn is_end_of_input(&self) -> bool {
        matches!(self, Self::EndOfInput)
    }
}

/// Failure reported by the backend inside the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendError {
    pub code: String,
    pub message: String,
}

impl BackendError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Backend-to-client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A fragment of the response text.
    Content(String),
    /// Key/value pairs, applied in order.
    Metadata(Vec<(String, String)>),
    /// The backend finished this turn.
    Terminal,
    /// The backend gave up on this turn.
    Error(BackendError),
}

/// Kind tag of an [`InboundEvent`], for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Content,
    Metadata,
    Terminal,
    Error,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Metadata => "metadata",
            Self::Terminal => "terminal",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InboundEvent {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content(text.into())
    }

    pub fn metadata<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Metadata(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(BackendError::new(code, message))
    }

    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Content(_) => EventKind::Content,
            Self::Metadata(_) => EventKind::Metadata,
            Self::Terminal => EventKind::Terminal,
            Self::Error(_) => EventKind::Error,
        }
    }
}
