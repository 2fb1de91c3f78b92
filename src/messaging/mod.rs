//! Message delivery infrastructure.
//!
//! - `channel` - Per-consumer ordered dispatch queue with run-state gating
//! - `audit` - Duplicate-delivery detection across redelivery and recovery
//! - `redelivery` - Redelivery backoff policy

pub mod audit;
pub mod channel;
pub mod redelivery;

pub use audit::*;
pub use channel::*;
pub use redelivery::*;
