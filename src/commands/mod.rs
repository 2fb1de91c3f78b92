//! Protocol command model.
//!
//! This module defines the typed records the wire layer produces and
//! consumes:
//! - `ids` - Hierarchical identifiers (connection, session, producer,
//!   consumer, transaction, message)
//! - `info` - Descriptor records and message/ack/response payloads
//! - `visitor` - Command envelope and exhaustive visitor dispatch

pub mod ids;
pub mod info;
pub mod visitor;

pub use ids::*;
pub use info::*;
pub use visitor::*;
