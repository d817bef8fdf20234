//! Failures a chat turn can resolve to.

use std::fmt;
use std::time::Duration;

use crate::collector::ChatResult;
use crate::frame::BackendError;
use crate::pump::PumpError;
use crate::transport::TransportError;

/// Why the inbound stream ended without a terminal marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    /// The backend sent an error frame.
    Backend(BackendError),
    /// The channel closed before any terminal marker.
    ChannelClosed,
}

impl fmt::Display for AbortCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(err) => write!(f, "backend error {err}"),
            Self::ChannelClosed => f.write_str("channel closed before terminal marker"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Connection failed: {0}")]
    Connection(#[source] TransportError),

    #[error("Send failed: {0}")]
    Send(#[from] PumpError),

    #[error("Receive failed: {0}")]
    TransportRead(#[source] TransportError),

    /// `partial` is diagnostic only; it is never a usable result.
    #[error("Stream aborted: {cause}")]
    StreamAborted {
        cause: AbortCause,
        partial: Box<ChatResult>,
    },

    #[error("Session cancelled")]
    Cancelled,

    #[error("Session timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether a fresh session may succeed where this one failed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Backend error carried by a `StreamAborted`, if any.
    pub const fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::StreamAborted {
                cause: AbortCause::Backend(err),
                ..
            } => Some(err),
            _ => None,
        }
    }
}
