//! Hierarchical protocol identifiers.
//!
//! Every broker-visible entity is addressed by a structured id that embeds
//! its parents: connection → session → producer/consumer, and message ids
//! derive from a producer id plus a sequence number. The ids are plain value
//! types so they can serve as map keys throughout the state registry.

use std::cmp::Ordering;
use std::fmt;

/// Compare two connection-id strings folding ASCII case.
///
/// Ordering across the id hierarchy folds the case of the connection-id
/// component while equality stays exact. Map ordering on the broker side is
/// case-insensitive, so an ordered map keyed by ids must agree with it.
fn cmp_connection_values(a: &str, b: &str) -> Ordering {
    let lhs = a.bytes().map(|byte| byte.to_ascii_lowercase());
    let rhs = b.bytes().map(|byte| byte.to_ascii_lowercase());
    lhs.cmp(rhs)
}

// ---------------------------------------------------------------------------
// ConnectionId
// ---------------------------------------------------------------------------

/// Identifier of one client connection to the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ConnectionId {
    pub value: String,
}

impl ConnectionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Ord for ConnectionId {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_connection_values(&self.value, &other.value)
    }
}

impl PartialOrd for ConnectionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identifier of one session on a connection.
///
/// `value` is the connection-local session sequence number. The default
/// connection-scoped session uses sequence `-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SessionId {
    pub connection_id: String,
    pub value: i64,
}

impl SessionId {
    pub fn new(connection_id: &ConnectionId, value: i64) -> Self {
        Self {
            connection_id: connection_id.value.clone(),
            value,
        }
    }

    pub fn parent_id(&self) -> ConnectionId {
        ConnectionId::new(self.connection_id.clone())
    }
}

impl From<&ProducerId> for SessionId {
    fn from(id: &ProducerId) -> Self {
        Self {
            connection_id: id.connection_id.clone(),
            value: id.session_id,
        }
    }
}

impl From<&ConsumerId> for SessionId {
    fn from(id: &ConsumerId) -> Self {
        Self {
            connection_id: id.connection_id.clone(),
            value: id.session_id,
        }
    }
}

impl Ord for SessionId {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_connection_values(&self.connection_id, &other.connection_id)
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for SessionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connection_id, self.value)
    }
}

// ---------------------------------------------------------------------------
// ProducerId / ConsumerId
// ---------------------------------------------------------------------------

/// Identifier of one producer within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProducerId {
    pub connection_id: String,
    pub session_id: i64,
    pub value: i64,
}

impl ProducerId {
    pub fn new(session_id: &SessionId, value: i64) -> Self {
        Self {
            connection_id: session_id.connection_id.clone(),
            session_id: session_id.value,
            value,
        }
    }

    pub fn parent_id(&self) -> SessionId {
        SessionId::from(self)
    }
}

impl Ord for ProducerId {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_connection_values(&self.connection_id, &other.connection_id)
            .then_with(|| self.session_id.cmp(&other.session_id))
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for ProducerId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_id, self.value)
    }
}

/// Identifier of one consumer within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ConsumerId {
    pub connection_id: String,
    pub session_id: i64,
    pub value: i64,
}

impl ConsumerId {
    pub fn new(session_id: &SessionId, value: i64) -> Self {
        Self {
            connection_id: session_id.connection_id.clone(),
            session_id: session_id.value,
            value,
        }
    }

    pub fn parent_id(&self) -> SessionId {
        SessionId::from(self)
    }
}

impl Ord for ConsumerId {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_connection_values(&self.connection_id, &other.connection_id)
            .then_with(|| self.session_id.cmp(&other.session_id))
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for ConsumerId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection_id, self.session_id, self.value)
    }
}

// ---------------------------------------------------------------------------
// TransactionId
// ---------------------------------------------------------------------------

/// Identifier of one connection-local transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TransactionId {
    pub connection_id: String,
    pub value: i64,
}

impl TransactionId {
    pub fn new(connection_id: &ConnectionId, value: i64) -> Self {
        Self {
            connection_id: connection_id.value.clone(),
            value,
        }
    }
}

impl Ord for TransactionId {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_connection_values(&self.connection_id, &other.connection_id)
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for TransactionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TX:{}:{}", self.connection_id, self.value)
    }
}

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Identifier of one message, derived from its producer and sequence.
///
/// `broker_sequence_id` is assigned broker-side and does not participate in
/// equality or ordering; two arrivals of the same producer message compare
/// equal even when the broker re-sequences them.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageId {
    pub producer_id: ProducerId,
    pub producer_sequence_id: i64,
    pub broker_sequence_id: i64,
}

impl MessageId {
    pub fn new(producer_id: ProducerId, producer_sequence_id: i64) -> Self {
        Self {
            producer_id,
            producer_sequence_id,
            broker_sequence_id: 0,
        }
    }
}

impl PartialEq for MessageId {
    fn eq(&self, other: &Self) -> bool {
        self.producer_id == other.producer_id
            && self.producer_sequence_id == other.producer_sequence_id
    }
}

impl Eq for MessageId {}

impl std::hash::Hash for MessageId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.producer_id.hash(state);
        self.producer_sequence_id.hash(state);
    }
}

impl Ord for MessageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.producer_id
            .cmp(&other.producer_id)
            .then_with(|| self.producer_sequence_id.cmp(&other.producer_sequence_id))
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.producer_id, self.producer_sequence_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
