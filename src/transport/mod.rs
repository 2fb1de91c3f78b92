//! Transport boundary and request correlation.
//!
//! The wire transport itself (sockets, TLS, framing) lives outside this
//! crate; it is reached through the one-way [`Transport`] trait. On top of
//! that seam:
//! - `future_response` - One-shot response slot resolved by the reader thread
//! - `correlator` - Command-id stamping and request/response correlation
//! - `mock` - Recording transport for tests

use thiserror::Error;

use crate::commands::Command;

pub mod correlator;
pub mod future_response;
pub mod mock;

pub use correlator::*;
pub use future_response::*;
pub use mock::MockTransport;

/// Failures crossing the transport seam.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport was closed; no further traffic is possible.
    #[error("transport has been closed")]
    Closed,
    /// The underlying connection failed. Retryable after reconnect.
    #[error("transport i/o failure: {0}")]
    Io(String),
    /// A request completed without a stored response (timed out or the
    /// future was abandoned). Retryable.
    #[error("no response received for command {command_id}")]
    NoResponse { command_id: i32 },
}

/// One-way command sink provided by the excluded wire transport.
///
/// The correlator assigns command ids before handing commands down, so
/// implementations transmit what they are given without touching the
/// envelope.
pub trait Transport: Send + Sync {
    fn oneway(&self, command: Command) -> Result<(), TransportError>;
}
