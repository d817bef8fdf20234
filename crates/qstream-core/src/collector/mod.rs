//! Inbound side of a session: reads backend frames and assembles the result.
//!
//! ```text
//! AwaitingFirstFrame -> Accumulating (content / metadata, repeatable)
//!                    -> Completed    (terminal marker)
//!                    -> Failed       (error frame or channel close)
//! ```
//!
//! Arrival order is authoritative; fragments are never reordered here.

mod accumulator;

pub use accumulator::{ChatResult, ResultAccumulator, TurnStatus};

use tracing::{debug, error, info, warn};

use crate::frame::InboundEvent;
use crate::session::{AbortCause, SessionError};
use crate::transport::{ChannelReader, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    AwaitingFirstFrame,
    Accumulating,
    Completed,
    Failed,
}

impl CollectorState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

pub struct InboundCollector {
    reader: ChannelReader,
    accumulator: ResultAccumulator,
    state: CollectorState,
    frames: u64,
}

impl InboundCollector {
    pub fn new(reader: ChannelReader) -> Self {
        Self {
            reader,
            accumulator: ResultAccumulator::new(),
            state: CollectorState::AwaitingFirstFrame,
            frames: 0,
        }
    }

    pub const fn state(&self) -> CollectorState {
        self.state
    }

    /// Fold one event into the accumulator. Events arriving after a terminal
    /// state are a protocol violation and are dropped.
    pub fn apply(&mut self, event: InboundEvent) -> CollectorState {
        if self.state.is_terminal() {
            warn!(
                kind = %event.kind(),
                state = ?self.state,
                "Ignoring inbound frame after terminal state"
            );
            return self.state;
        }

        self.frames += 1;
        self.state = match event {
            InboundEvent::Content(fragment) => {
                debug!(frame = self.frames, bytes = fragment.len(), "Content fragment");
                self.accumulator.push_content(fragment);
                CollectorState::Accumulating
            }
            InboundEvent::Metadata(entries) => {
                debug!(frame = self.frames, entries = entries.len(), "Metadata");
                self.accumulator.upsert_metadata(entries);
                CollectorState::Accumulating
            }
            InboundEvent::Terminal => {
                self.accumulator.complete();
                CollectorState::Completed
            }
            InboundEvent::Error(err) => {
                warn!(code = %err.code, message = %err.message, "Backend reported an error");
                self.accumulator.fail(Some(err));
                CollectorState::Failed
            }
        };
        self.state
    }

    /// Read until the turn reaches a terminal state.
    pub async fn run(mut self) -> Result<ChatResult, SessionError> {
        loop {
            match self.reader.read().await {
                Some(Ok(event)) => match self.apply(event) {
                    CollectorState::Completed => {
                        self.drain_trailing();
                        info!(
                            frames = self.frames,
                            fragments = self.accumulator.fragment_count(),
                            "Backend finished turn"
                        );
                        return Ok(self.accumulator.finish());
                    }
                    CollectorState::Failed => {
                        let partial = self.accumulator.finish();
                        let cause = partial
                            .error
                            .clone()
                            .map_or(AbortCause::ChannelClosed, AbortCause::Backend);
                        return Err(SessionError::StreamAborted {
                            cause,
                            partial: Box::new(partial),
                        });
                    }
                    CollectorState::AwaitingFirstFrame | CollectorState::Accumulating => {}
                },
                // Transports that connect lazily report a failed handshake
                // here; it stays a connection failure while nothing arrived.
                Some(Err(e @ TransportError::Connect(_))) if self.frames == 0 => {
                    warn!(error = %e, "Backend connection failed before any frame");
                    return Err(SessionError::Connection(e));
                }
                Some(Err(e)) => {
                    error!(error = %e, frames = self.frames, "Inbound stream failed");
                    return Err(SessionError::TransportRead(e));
                }
                None => {
                    warn!(frames = self.frames, "Channel closed before terminal marker");
                    self.accumulator.fail(None);
                    self.state = CollectorState::Failed;
                    return Err(SessionError::StreamAborted {
                        cause: AbortCause::ChannelClosed,
                        partial: Box::new(self.accumulator.finish()),
                    });
                }
            }
        }
    }

    /// Log whatever the backend already queued behind the terminal marker.
    fn drain_trailing(&mut self) {
        while let Some(frame) = self.reader.try_read() {
            match frame {
                Ok(event) => {
                    self.apply(event);
                }
                Err(e) => debug!(error = %e, "Ignoring transport error after terminal state"),
            }
        }
    }
}
