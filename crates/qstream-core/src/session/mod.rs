//! One-shot chat session: owns the duplex channel for a single turn and runs
//! the outbound pump against the inbound collector until exactly one outcome
//! is reached.

mod error;
mod state;

pub use error::{AbortCause, SessionError};
pub use state::{SessionState, SessionStatus};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::collector::{ChatResult, InboundCollector};
use crate::config::SessionConfig;
use crate::identity::SessionIdentity;
use crate::pump::{OutboundPump, PumpError, PumpReport};
use crate::source::EventSource;
use crate::transport::Transport;

/// What a session task finished with.
enum Direction {
    Outbound(Result<PumpReport, PumpError>),
    Inbound(Result<ChatResult, SessionError>),
}

pub struct ChatSession<T: Transport> {
    id: Uuid,
    identity: SessionIdentity,
    transport: Arc<T>,
    settings: SessionConfig,
    state: SessionState,
    cancel: CancellationToken,
}

impl<T: Transport> ChatSession<T> {
    pub fn new(identity: SessionIdentity, transport: Arc<T>, settings: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            transport,
            settings,
            state: SessionState::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub const fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Watch the session move from `Active` to its resolution.
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.state.subscribe()
    }

    /// Token that aborts the session when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the turn: stream `events` to the backend and return the assembled
    /// result, or the first failure observed by either direction.
    #[instrument(
        name = "chat_session",
        skip_all,
        fields(
            session_id = %self.id,
            account = self.identity.account(),
            application = self.identity.application(),
            user = self.identity.user(),
        )
    )]
    pub async fn send(self, events: EventSource) -> Result<ChatResult, SessionError> {
        let outcome = match self.settings.turn_timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.drive(events)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(?limit, "Turn timed out");
                    Err(SessionError::TimedOut(limit))
                }
            },
            None => self.drive(events).await,
        };

        let status = match &outcome {
            Ok(_) => SessionStatus::Completed,
            Err(SessionError::Cancelled | SessionError::TimedOut(_)) => SessionStatus::Cancelled,
            Err(_) => SessionStatus::Failed,
        };
        self.state.resolve(status);

        match &outcome {
            Ok(result) => info!(
                fragments = result.content.len(),
                metadata = result.metadata.len(),
                "Session completed"
            ),
            Err(e) => info!(error = %e, ?status, "Session resolved without a result"),
        }
        outcome
    }

    async fn drive(&self, events: EventSource) -> Result<ChatResult, SessionError> {
        let channel = tokio::select! {
            () = self.cancel.cancelled() => return Err(SessionError::Cancelled),
            opened = self.transport.open_channel(&self.identity) => {
                opened.map_err(|e| {
                    warn!(error = %e, "Failed to open duplex channel");
                    SessionError::Connection(e)
                })?
            }
        };
        info!("Duplex channel opened");

        let (writer, reader, mut guard) = channel.split();
        let mut tasks = JoinSet::new();
        tasks.spawn(
            async move { Direction::Outbound(OutboundPump::new(events, writer).run().await) }
                .in_current_span(),
        );
        tasks.spawn(
            async move { Direction::Inbound(InboundCollector::new(reader).run().await) }
                .in_current_span(),
        );

        let outcome = self.wait(&mut tasks).await;

        guard.close();
        tasks.shutdown().await;
        outcome
    }

    async fn wait(&self, tasks: &mut JoinSet<Direction>) -> Result<ChatResult, SessionError> {
        let mut outbound_done = false;
        loop {
            let joined = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!("Session cancelled");
                    return Err(SessionError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else {
                return Err(SessionError::Internal(
                    "session tasks exited without an outcome".into(),
                ));
            };
            let direction = joined
                .map_err(|e| SessionError::Internal(format!("session task failed: {e}")))?;

            match direction {
                Direction::Outbound(Ok(report)) => {
                    debug!(events_sent = report.events_sent, "Outbound direction finished");
                    outbound_done = true;
                }
                Direction::Outbound(Err(e)) => {
                    error!(error = %e, sent = e.sent(), "Outbound direction failed");
                    return Err(SessionError::Send(e));
                }
                Direction::Inbound(Ok(result)) => {
                    if !outbound_done {
                        self.flush_outbound(tasks).await?;
                    }
                    return Ok(result);
                }
                Direction::Inbound(Err(e)) => return Err(e),
            }
        }
    }

    /// The backend already answered; give the pump a bounded window to write
    /// end-of-input. Its outcome no longer affects the result, but a
    /// cancellation inside the window still does.
    async fn flush_outbound(&self, tasks: &mut JoinSet<Direction>) -> Result<(), SessionError> {
        let grace = self.settings.end_of_input_grace();
        let flushed = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                info!("Session cancelled while flushing outbound");
                return Err(SessionError::Cancelled);
            }
            flushed = tokio::time::timeout(grace, tasks.join_next()) => flushed,
        };
        match flushed {
            Ok(Some(Ok(Direction::Outbound(Ok(report))))) => {
                debug!(events_sent = report.events_sent, "Outbound flushed after completion");
            }
            Ok(Some(Ok(Direction::Outbound(Err(e))))) => {
                warn!(error = %e, "Outbound failed after the turn completed");
            }
            Ok(Some(Err(e))) => warn!(error = %e, "Outbound task ended abnormally"),
            Ok(Some(Ok(Direction::Inbound(_))) | None) => {}
            Err(_) => warn!(?grace, "Outbound still draining after grace period, aborting"),
        }
        Ok(())
    }
}

impl<T: Transport> std::fmt::Debug for ChatSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("status", &self.state.current())
            .finish_non_exhaustive()
    }
}
