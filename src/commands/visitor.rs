//! Command envelope and exhaustive visitor dispatch.
//!
//! Inbound and outbound traffic is a closed set of command kinds. Routing a
//! command to its handler is an exhaustive match behind `Command::visit`, so
//! adding a kind forces every visitor implementation to handle it and no
//! caller ever branches on payload tags itself.

use crate::commands::ids::{ConnectionId, ConsumerId, ProducerId, SessionId};
use crate::commands::info::{
    ConnectionInfo, ConsumerControl, ConsumerInfo, DestinationInfo, Message, MessageAck,
    MessageDispatch, MessagePull, ProducerInfo, Response, SessionInfo, TransactionInfo,
};

/// Every command kind the client core sends or receives.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CommandPayload {
    ConnectionInfo(ConnectionInfo),
    SessionInfo(SessionInfo),
    ProducerInfo(ProducerInfo),
    ConsumerInfo(ConsumerInfo),
    DestinationInfo(DestinationInfo),
    RemoveConnection(ConnectionId),
    RemoveSession(SessionId),
    RemoveProducer(ProducerId),
    RemoveConsumer(ConsumerId),
    RemoveDestination(DestinationInfo),
    Transaction(TransactionInfo),
    Message(Message),
    MessageAck(MessageAck),
    MessagePull(MessagePull),
    MessageDispatch(MessageDispatch),
    ConsumerControl(ConsumerControl),
    Response(Response),
    Shutdown,
    KeepAlive,
}

/// Envelope around a payload, carrying the correlation fields the transport
/// layer stamps before the command reaches the wire.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Command {
    pub command_id: i32,
    pub response_required: bool,
    pub payload: CommandPayload,
}

impl Command {
    pub fn new(payload: CommandPayload) -> Self {
        Self {
            command_id: 0,
            response_required: false,
            payload,
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self.payload, CommandPayload::Response(_))
    }

    pub fn is_message(&self) -> bool {
        matches!(self.payload, CommandPayload::Message(_))
    }

    /// Route this command to the visitor method matching its kind.
    pub fn visit<V: CommandVisitor>(&self, visitor: &V) -> V::Output {
        match &self.payload {
            CommandPayload::ConnectionInfo(info) => visitor.process_connection_info(info),
            CommandPayload::SessionInfo(info) => visitor.process_session_info(info),
            CommandPayload::ProducerInfo(info) => visitor.process_producer_info(info),
            CommandPayload::ConsumerInfo(info) => visitor.process_consumer_info(info),
            CommandPayload::DestinationInfo(info) => visitor.process_destination_info(info),
            CommandPayload::RemoveConnection(id) => visitor.process_remove_connection(id),
            CommandPayload::RemoveSession(id) => visitor.process_remove_session(id),
            CommandPayload::RemoveProducer(id) => visitor.process_remove_producer(id),
            CommandPayload::RemoveConsumer(id) => visitor.process_remove_consumer(id),
            CommandPayload::RemoveDestination(info) => visitor.process_remove_destination(info),
            CommandPayload::Transaction(info) => visitor.process_transaction(self, info),
            CommandPayload::Message(message) => visitor.process_message(self, message),
            CommandPayload::MessageAck(ack) => visitor.process_message_ack(ack),
            CommandPayload::MessagePull(pull) => visitor.process_message_pull(pull),
            CommandPayload::MessageDispatch(dispatch) => {
                visitor.process_message_dispatch(dispatch)
            }
            CommandPayload::ConsumerControl(control) => visitor.process_consumer_control(control),
            CommandPayload::Response(response) => visitor.process_response(response),
            CommandPayload::Shutdown => visitor.process_shutdown(),
            CommandPayload::KeepAlive => visitor.process_keep_alive(),
        }
    }
}

impl From<CommandPayload> for Command {
    fn from(payload: CommandPayload) -> Self {
        Command::new(payload)
    }
}

/// One method per command kind.
///
/// Methods take `&self`: concrete visitors are services shared between the
/// transport-reader thread and application threads, so their mutability is
/// interior. `Transaction` and `Message` handlers also receive the envelope
/// because tracking needs the command as sent (id included) for replay.
pub trait CommandVisitor {
    type Output;

    fn process_connection_info(&self, info: &ConnectionInfo) -> Self::Output;
    fn process_session_info(&self, info: &SessionInfo) -> Self::Output;
    fn process_producer_info(&self, info: &ProducerInfo) -> Self::Output;
    fn process_consumer_info(&self, info: &ConsumerInfo) -> Self::Output;
    fn process_destination_info(&self, info: &DestinationInfo) -> Self::Output;
    fn process_remove_connection(&self, id: &ConnectionId) -> Self::Output;
    fn process_remove_session(&self, id: &SessionId) -> Self::Output;
    fn process_remove_producer(&self, id: &ProducerId) -> Self::Output;
    fn process_remove_consumer(&self, id: &ConsumerId) -> Self::Output;
    fn process_remove_destination(&self, info: &DestinationInfo) -> Self::Output;
    fn process_transaction(&self, command: &Command, info: &TransactionInfo) -> Self::Output;
    fn process_message(&self, command: &Command, message: &Message) -> Self::Output;
    fn process_message_ack(&self, ack: &MessageAck) -> Self::Output;
    fn process_message_pull(&self, pull: &MessagePull) -> Self::Output;
    fn process_message_dispatch(&self, dispatch: &MessageDispatch) -> Self::Output;
    fn process_consumer_control(&self, control: &ConsumerControl) -> Self::Output;
    fn process_response(&self, response: &Response) -> Self::Output;
    fn process_shutdown(&self) -> Self::Output;
    fn process_keep_alive(&self) -> Self::Output;
}
