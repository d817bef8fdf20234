//! qstream Core Library
//!
//! Bidirectional chat-session streaming:
//! - Session identity and turn preparation
//! - Outbound pump with end-of-input signaling and backpressure
//! - Inbound collector assembling content and metadata into a result
//! - Session orchestration, cancellation and timeouts
//! - Transport seam plus an in-memory transport
//! - Configuration resolution and tracing setup

pub mod collector;
pub mod config;
pub mod error;
pub mod frame;
pub mod identity;
pub mod pump;
pub mod session;
pub mod source;
pub mod tracing_init;
pub mod transport;
pub mod turn;

pub use collector::{ChatResult, TurnStatus};
pub use config::Config;
pub use error::{Error, Result};
pub use frame::{BackendError, InboundEvent, OutboundEvent, OutboundFrame};
pub use identity::SessionIdentity;
pub use session::{AbortCause, ChatSession, SessionError, SessionStatus};
pub use source::{BoxError, EventSource};
pub use transport::{DuplexChannel, Transport, TransportError};
pub use turn::{ChatTurn, prepare_turn};
