//! Outbound side of a session: drains the event source into the channel.

use tracing::{debug, warn};

use crate::frame::{OutboundEvent, OutboundFrame};
use crate::source::{BoxError, EventSource};
use crate::transport::{ChannelWriter, TransportError};

/// Why the outbound direction stopped early.
#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    #[error("event source failed after {sent} events: {source}")]
    Producer { sent: u64, source: BoxError },

    #[error("transport write failed after {sent} events: {source}")]
    TransportWrite { sent: u64, source: TransportError },
}

impl PumpError {
    /// Events written before the failure.
    pub const fn sent(&self) -> u64 {
        match self {
            Self::Producer { sent, .. } | Self::TransportWrite { sent, .. } => *sent,
        }
    }
}

/// Summary of a pump that reached end-of-input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpReport {
    pub events_sent: u64,
}

pub struct OutboundPump {
    source: EventSource,
    writer: ChannelWriter,
    next_sequence: u64,
}

impl OutboundPump {
    pub const fn new(source: EventSource, writer: ChannelWriter) -> Self {
        Self {
            source,
            writer,
            next_sequence: 0,
        }
    }

    /// Forward every payload in source order, then one end-of-input frame.
    ///
    /// Suspends only while the source has nothing ready or the channel is
    /// full. A source error stops the pump without writing anything further.
    pub async fn run(mut self) -> Result<PumpReport, PumpError> {
        while let Some(item) = self.source.next().await {
            let sent = self.next_sequence;
            let payload = match item {
                Ok(payload) => payload,
                Err(source) => {
                    warn!(sent, error = %source, "Event source failed");
                    return Err(PumpError::Producer { sent, source });
                }
            };

            let frame = OutboundFrame::Event(OutboundEvent {
                sequence: sent,
                payload,
            });
            self.writer
                .write(frame)
                .await
                .map_err(|source| PumpError::TransportWrite { sent, source })?;
            debug!(sequence = sent, "Outbound event written");
            self.next_sequence += 1;
        }

        let sent = self.next_sequence;
        self.writer
            .write(OutboundFrame::EndOfInput)
            .await
            .map_err(|source| PumpError::TransportWrite { sent, source })?;
        debug!(events_sent = sent, "End of input written");

        Ok(PumpReport { events_sent: sent })
    }
}
