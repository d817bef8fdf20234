//! Entry point for callers: bind an identity once, send turns against it.

use std::fmt;
use std::sync::Arc;

use tokio_stream::Stream;

use crate::collector::ChatResult;
use crate::config::SessionConfig;
use crate::identity::SessionIdentity;
use crate::session::{ChatSession, SessionError};
use crate::source::{BoxError, EventSource};
use crate::transport::Transport;

/// Identity bound to a transport. Holds no per-turn state; each send builds a
/// fresh [`ChatSession`].
pub struct ChatTurn<T: Transport> {
    identity: SessionIdentity,
    transport: Arc<T>,
    settings: SessionConfig,
}

impl<T: Transport> Clone for ChatTurn<T> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            transport: Arc::clone(&self.transport),
            settings: self.settings.clone(),
        }
    }
}

impl<T: Transport> fmt::Debug for ChatTurn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatTurn")
            .field("identity", &self.identity)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ChatTurn<T> {
    /// Validate the identity. Nothing touches the transport until a send.
    pub fn prepare(
        transport: Arc<T>,
        account: impl Into<String>,
        application: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<Self, SessionError> {
        Ok(Self {
            identity: SessionIdentity::new(account, application, user)?,
            transport,
            settings: SessionConfig::default(),
        })
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SessionConfig) -> Self {
        self.settings = settings;
        self
    }

    pub const fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Build the one-shot session explicitly, e.g. to grab its status watch
    /// or cancellation token before sending.
    pub fn session(&self) -> ChatSession<T> {
        ChatSession::new(
            self.identity.clone(),
            Arc::clone(&self.transport),
            self.settings.clone(),
        )
    }

    /// Stream `events` through a new session and wait for its result.
    pub async fn send<S, I, E>(&self, events: S) -> Result<ChatResult, SessionError>
    where
        S: Stream<Item = Result<I, E>> + Send + 'static,
        I: Into<String> + 'static,
        E: Into<BoxError> + 'static,
    {
        self.session().send(EventSource::new(events)).await
    }

    pub async fn send_source(&self, events: EventSource) -> Result<ChatResult, SessionError> {
        self.session().send(events).await
    }
}

/// Free-function form of [`ChatTurn::prepare`].
pub fn prepare_turn<T: Transport>(
    transport: Arc<T>,
    account: impl Into<String>,
    application: impl Into<String>,
    user: impl Into<String>,
) -> Result<ChatTurn<T>, SessionError> {
    ChatTurn::prepare(transport, account, application, user)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;

    #[test]
    fn prepare_rejects_empty_user_without_io() {
        let (transport, mut listener) = MemoryTransport::new();
        let err = prepare_turn(Arc::new(transport), "acct", "app", "").unwrap_err();
        assert!(matches!(err, SessionError::InvalidIdentity(_)));
        assert!(listener.try_recv().is_err());
    }

    #[test]
    fn sessions_are_fresh_per_call() {
        let (transport, _listener) = MemoryTransport::new();
        let turn = prepare_turn(Arc::new(transport), "acct", "app", "user").unwrap();
        let a = turn.session();
        let b = turn.session();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.identity(), turn.identity());
    }

    #[test]
    fn debug_shows_identity_but_not_transport() {
        let (transport, _listener) = MemoryTransport::new();
        let turn = prepare_turn(Arc::new(transport), "acct", "app", "user").unwrap();
        let rendered = format!("{turn:?}");
        assert!(rendered.starts_with("ChatTurn"));
        assert!(rendered.contains("acct"));
        assert!(!rendered.contains("MemoryTransport"));
    }
}
