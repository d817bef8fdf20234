//! qstream Protocol Buffers
//!
//! Generated protobuf code for the qstream chat stream.
//!
//! This crate contains:
//! - `ChatInput` frames sent from the client (text, end-of-input)
//! - `ChatOutput` frames sent by the backend (text, metadata, terminal, error)
//! - `ChatService` client and server stubs, plus its method paths

#![allow(clippy::derive_partial_eq_without_eq)]

pub mod methods;

/// qstream v1 API definitions.
///
/// All generated types and services are included here.
pub mod v1 {
    tonic::include_proto!("qstream.v1");
}

// Re-export v1 as the default API version for convenience
pub use v1::*;
