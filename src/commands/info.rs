//! Descriptor records exchanged with the broker.
//!
//! These are the typed payloads the marshaling layer encodes onto the wire
//! and decodes back. The state registry stores them verbatim so a failover
//! can replay the matching "add" commands in order.

use bytes::Bytes;

use crate::commands::ids::{
    ConnectionId, ConsumerId, MessageId, ProducerId, SessionId, TransactionId,
};

// ---------------------------------------------------------------------------
// Destinations
// ---------------------------------------------------------------------------

/// Destination kind as the broker models it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DestinationKind {
    Queue,
    Topic,
    TempQueue,
    TempTopic,
}

/// A named queue or topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Destination {
    pub name: String,
    pub kind: DestinationKind,
}

impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::Queue,
        }
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::Topic,
        }
    }

    pub fn temp_queue(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DestinationKind::TempQueue,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(
            self.kind,
            DestinationKind::TempQueue | DestinationKind::TempTopic
        )
    }
}

// ---------------------------------------------------------------------------
// Connection / session / producer / consumer descriptors
// ---------------------------------------------------------------------------

/// Descriptor of a client connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub client_id: String,
    pub user_name: String,
    pub password: String,
    /// Set when the descriptor is replayed to a freshly reconnected broker so
    /// it can distinguish a failover re-register from a duplicate client id.
    pub failover_reconnect: bool,
}

impl ConnectionInfo {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            ..Self::default()
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }
}

/// Descriptor of a session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
}

impl SessionInfo {
    pub fn new(session_id: SessionId) -> Self {
        Self { session_id }
    }
}

/// Descriptor of a producer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProducerInfo {
    pub producer_id: ProducerId,
    pub destination: Option<Destination>,
}

impl ProducerInfo {
    pub fn new(producer_id: ProducerId) -> Self {
        Self {
            producer_id,
            destination: None,
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }
}

/// Descriptor of a consumer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConsumerInfo {
    pub consumer_id: ConsumerId,
    pub destination: Destination,
    /// Broker-side dispatch window; 0 turns the consumer into pull-only.
    pub prefetch_size: i32,
    pub exclusive: bool,
    /// Durable subscription name, when the consumer is durable.
    pub subscription_name: Option<String>,
}

impl ConsumerInfo {
    pub fn new(consumer_id: ConsumerId, destination: Destination) -> Self {
        Self {
            consumer_id,
            destination,
            prefetch_size: 1000,
            exclusive: false,
            subscription_name: None,
        }
    }

    pub fn with_prefetch_size(mut self, prefetch_size: i32) -> Self {
        self.prefetch_size = prefetch_size;
        self
    }
}

/// Descriptor of a destination add/remove on a connection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DestinationInfo {
    pub connection_id: ConnectionId,
    pub destination: Destination,
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Phase carried by a transaction command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TransactionPhase {
    Begin,
    Prepare,
    CommitOnePhase,
    CommitTwoPhase,
    Rollback,
    End,
}

/// Descriptor of a transaction operation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransactionInfo {
    pub connection_id: ConnectionId,
    pub transaction_id: TransactionId,
    pub phase: TransactionPhase,
}

impl TransactionInfo {
    pub fn new(
        connection_id: ConnectionId,
        transaction_id: TransactionId,
        phase: TransactionPhase,
    ) -> Self {
        Self {
            connection_id,
            transaction_id,
            phase,
        }
    }
}

// ---------------------------------------------------------------------------
// Messages and acknowledgments
// ---------------------------------------------------------------------------

/// An identified message with an opaque payload.
///
/// Body encoding is a marshaling concern; this core only needs identity,
/// routing, and the payload length for cache accounting.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub destination: Destination,
    pub transaction_id: Option<TransactionId>,
    pub payload: Bytes,
    pub persistent: bool,
}

impl Message {
    pub fn new(message_id: MessageId, destination: Destination, payload: Bytes) -> Self {
        Self {
            message_id,
            destination,
            transaction_id: None,
            payload,
            persistent: true,
        }
    }

    pub fn with_transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// Payload size in bytes, the unit the replay-cache budget counts.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// One inbound delivery destined for a consumer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageDispatch {
    pub consumer_id: ConsumerId,
    pub destination: Destination,
    pub message: Message,
    /// Number of times this message was re-presented without an intervening
    /// acknowledgment.
    pub redelivery_counter: i32,
    /// Populated when the dispatch is re-queued because of a rollback.
    pub rollback_cause: Option<String>,
}

impl MessageDispatch {
    pub fn new(consumer_id: ConsumerId, message: Message) -> Self {
        Self {
            consumer_id,
            destination: message.destination.clone(),
            message,
            redelivery_counter: 0,
            rollback_cause: None,
        }
    }
}

/// Acknowledgment kinds the broker distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AckKind {
    Standard,
    Poison,
    Redelivered,
    Individual,
}

/// Acknowledgment of one or more deliveries.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageAck {
    pub consumer_id: ConsumerId,
    pub transaction_id: Option<TransactionId>,
    pub last_message_id: MessageId,
    pub ack_kind: AckKind,
    pub message_count: i32,
}

/// Explicit pull request from a zero-prefetch consumer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessagePull {
    pub consumer_id: ConsumerId,
    pub destination: Destination,
    pub timeout_millis: i64,
}

/// Broker-initiated adjustment of a consumer's dispatch window.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConsumerControl {
    pub consumer_id: ConsumerId,
    pub destination: Destination,
    pub prefetch: i32,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Failure detail carried by an exception response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BrokerFault {
    pub exception_class: String,
    pub message: String,
}

/// Body of a correlated response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResponseBody {
    Ok,
    Exception(BrokerFault),
}

/// Reply to a `response_required` command.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Response {
    /// Command id of the request this response answers.
    pub correlation_id: i32,
    pub body: ResponseBody,
}

impl Response {
    pub fn ok(correlation_id: i32) -> Self {
        Self {
            correlation_id,
            body: ResponseBody::Ok,
        }
    }

    pub fn exception(correlation_id: i32, fault: BrokerFault) -> Self {
        Self {
            correlation_id,
            body: ResponseBody::Exception(fault),
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self.body, ResponseBody::Exception(_))
    }
}
