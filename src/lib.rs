#![deny(unused, dead_code)]
#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Numeric casts: intentional in protocol code
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
// Control flow style
#![allow(clippy::single_match_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::if_not_else)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::manual_let_else)]
// Passing style
#![allow(clippy::needless_pass_by_value)]
// Option/Result patterns
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
// Struct field patterns
#![allow(clippy::struct_excessive_bools)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Import style
#![allow(clippy::wildcard_imports)]
// Iteration style
#![allow(clippy::explicit_iter_loop)]
// Explicit returns
#![allow(clippy::needless_return)]

//! Courier client core - protocol state engine for the Courier broker client.
//!
//! This crate is the state heart of the client: everything here is in-memory,
//! rebuilt from the broker on reconnect, and shared between one dedicated
//! transport-reader thread and any number of application threads.
//!
//! # Module Organization
//!
//! ## Commands
//! - `commands::ids` - Hierarchical identifiers
//! - `commands::info` - Descriptor and message records
//! - `commands::visitor` - Command envelope and exhaustive dispatch
//!
//! ## State
//! - `state::connection` / `state::session` / `state::transaction` - Registry
//!   nodes
//! - `state::tracker` - Command tracking and failover restore
//!
//! ## Transport
//! - `transport::future_response` - One-shot response slot
//! - `transport::correlator` - Request/response correlation
//! - `transport::mock` - Recording transport for tests
//!
//! ## Messaging
//! - `messaging::channel` - Per-consumer dispatch queue
//! - `messaging::audit` - Duplicate-delivery detection
//! - `messaging::redelivery` - Redelivery backoff policy
//!
//! ## Util
//! - `util::service` - Start/stop lifecycle support

// Command model
pub mod commands;

// State registry
pub mod state;

// Transport seam
pub mod transport;

// Message delivery
pub mod messaging;

// Shared infrastructure
pub mod util;

// Re-exports for convenience
pub use commands::{ids, info, visitor};
pub use messaging::{audit, channel, redelivery};
pub use state::tracker;
pub use transport::{correlator, future_response};
pub use util::service;
