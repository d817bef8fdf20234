//! qstream CLI Library
//!
//! gRPC and Amazon Q Business transports for the chat stream, and the demo
//! runner behind the `qstream` binary.

pub mod connection;
pub mod demo;
pub mod qbusiness;
