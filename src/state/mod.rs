//! Client-side broker state registry.
//!
//! The registry is the authoritative, enumerable record of what the client
//! believes exists on the broker:
//! - `connection` - Connection node owning sessions, transactions, and
//!   temporary destinations
//! - `session` - Session node owning producer and consumer records
//! - `transaction` - Transaction node owning its replay log and adopted
//!   producers
//! - `tracker` - Registry owner, command tracking, and the failover restore
//!   walk
//!
//! Each node serializes its own maps; no lock spans more than one node.

use thiserror::Error;

pub mod connection;
pub mod session;
pub mod tracker;
pub mod transaction;

pub use connection::*;
pub use session::*;
pub use tracker::*;
pub use transaction::*;

/// Registry precondition failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    /// The targeted node was already torn down. Never retried automatically.
    #[error("{entity} has already been disposed")]
    Disposed { entity: String },
    /// A lookup addressed an id the registry does not hold.
    #[error("no {kind} registered for {id}")]
    NotFound { kind: &'static str, id: String },
}
