//! Connection state tracking and failover replay.
//!
//! The tracker owns the whole registry: every command the client sends flows
//! through [`ConnectionStateTracker::track`], which mutates the matching
//! registry node. After a transport failover,
//! [`ConnectionStateTracker::restore`] walks the registry and regenerates the
//! "add" commands that bring the new broker in sync: connections first, then
//! temporary destinations, sessions, producers, consumers, transactions, and
//! finally any cached messages and pulls.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::commands::{
    BrokerFault, Command, CommandPayload, CommandVisitor, ConnectionId, ConnectionInfo,
    ConsumerControl, ConsumerId, ConsumerInfo, DestinationInfo, Message, MessageAck,
    MessageDispatch, MessageId, MessagePull, ProducerId, ProducerInfo, Response, SessionId,
    SessionInfo, TransactionInfo, TransactionPhase,
};
use crate::state::connection::ConnectionState;
use crate::state::session::SessionState;
use crate::state::StateError;
use crate::transport::{Transport, TransportError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tracking and restore toggles.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Record transaction commands for replay. Off by default; the failover
    /// layer opts in when it owns transaction recovery.
    pub track_transactions: bool,
    pub restore_sessions: bool,
    pub restore_consumers: bool,
    pub restore_producers: bool,
    pub restore_transactions: bool,
    /// Cache non-transacted messages for replay after failover.
    pub track_messages: bool,
    /// Adopt producers into their transaction when they are closed before
    /// the transaction completes.
    pub track_transaction_producers: bool,
    /// Replay-cache budget in payload bytes.
    pub max_message_cache_bytes: usize,
    /// Replay-cache bound for pull commands, one slot per
    /// destination+consumer.
    pub max_message_pull_cache_entries: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_transactions: false,
            restore_sessions: true,
            restore_consumers: true,
            restore_producers: true,
            restore_transactions: true,
            track_messages: true,
            track_transaction_producers: true,
            max_message_cache_bytes: 128 * 1024,
            max_message_pull_cache_entries: 10,
        }
    }
}

impl TrackerConfig {
    pub fn with_track_transactions(mut self, enabled: bool) -> Self {
        self.track_transactions = enabled;
        self
    }

    pub fn with_track_messages(mut self, enabled: bool) -> Self {
        self.track_messages = enabled;
        self
    }

    pub fn with_max_message_cache_bytes(mut self, bytes: usize) -> Self {
        self.max_message_cache_bytes = bytes;
        self
    }
}

// ---------------------------------------------------------------------------
// Replay caches
// ---------------------------------------------------------------------------

/// Non-transacted messages kept for replay, evicted oldest-first once the
/// accounted payload bytes exceed the budget.
struct MessageCache {
    entries: HashMap<MessageId, Message>,
    order: VecDeque<MessageId>,
    accounted_bytes: usize,
    max_bytes: usize,
}

impl MessageCache {
    fn new(max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            accounted_bytes: 0,
            max_bytes,
        }
    }

    fn put(&mut self, message: Message) {
        let id = message.message_id.clone();
        if self.entries.insert(id.clone(), message).is_none() {
            self.order.push_back(id);
        }
    }

    /// Account a sent message's size and evict oldest entries past budget.
    fn account(&mut self, size: usize) {
        self.accounted_bytes += size;
        while self.accounted_bytes > self.max_bytes && !self.order.is_empty() {
            if let Some(evicted) = self.order.pop_front() {
                if let Some(message) = self.entries.remove(&evicted) {
                    self.accounted_bytes = self.accounted_bytes.saturating_sub(message.size());
                }
            }
        }
    }

    fn values_in_order(&self) -> Vec<Message> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Latest pull command per destination+consumer, bounded by entry count.
struct PullCache {
    entries: HashMap<String, Command>,
    order: VecDeque<String>,
    max_entries: usize,
}

impl PullCache {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn put(&mut self, key: String, command: Command) {
        if self.entries.insert(key.clone(), command).is_none() {
            self.order.push_back(key);
            while self.order.len() > self.max_entries {
                if let Some(evicted) = self.order.pop_front() {
                    self.entries.remove(&evicted);
                }
            }
        }
    }

    fn values_in_order(&self) -> Vec<Command> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).cloned())
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Tracked commands
// ---------------------------------------------------------------------------

/// Work to run once the broker has answered a tracked command.
#[derive(Debug, Clone)]
enum CompletionAction {
    RemoveTransaction(TransactionInfo),
}

/// Marker returned by [`ConnectionStateTracker::track`] for commands the
/// registry recorded. Some carry a completion to run after the broker
/// acknowledges the command; pass those back via
/// [`ConnectionStateTracker::complete`].
#[derive(Debug, Default)]
pub struct Tracked {
    completion: Option<CompletionAction>,
}

impl Tracked {
    fn new() -> Self {
        Self::default()
    }

    fn with_completion(action: CompletionAction) -> Self {
        Self {
            completion: Some(action),
        }
    }

    pub fn needs_completion(&self) -> bool {
        self.completion.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

type TrackOutcome = Result<Option<Tracked>, StateError>;

/// The authoritative record of what the client believes exists broker-side.
pub struct ConnectionStateTracker {
    config: TrackerConfig,
    connections: Mutex<HashMap<ConnectionId, Arc<ConnectionState>>>,
    message_cache: Mutex<MessageCache>,
    pull_cache: Mutex<PullCache>,
}

impl Default for ConnectionStateTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl ConnectionStateTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let message_cache = MessageCache::new(config.max_message_cache_bytes);
        let pull_cache = PullCache::new(config.max_message_pull_cache_entries);
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
            message_cache: Mutex::new(message_cache),
            pull_cache: Mutex::new(pull_cache),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Record an outbound command in the registry.
    ///
    /// Returns `Ok(Some)` when the command kind is tracked, `Ok(None)` when
    /// it is not, and `Err` when it targets a disposed node.
    pub fn track(&self, command: &Command) -> TrackOutcome {
        command.visit(self)
    }

    /// Account a command after it was handed to the transport. Only
    /// non-transacted messages carry replay-cache weight.
    pub fn track_back(&self, command: &Command) {
        if !self.config.track_messages {
            return;
        }
        if let CommandPayload::Message(message) = &command.payload {
            if message.transaction_id.is_none() {
                self.message_cache.lock().account(message.size());
            }
        }
    }

    /// Run the completion carried by a tracked command, once its response
    /// has arrived.
    pub fn complete(&self, tracked: Tracked) {
        if let Some(CompletionAction::RemoveTransaction(info)) = tracked.completion {
            if let Some(connection) = self.connection_state(&info.connection_id) {
                if let Some(transaction) = connection.remove_transaction_state(&info.transaction_id)
                {
                    transaction.clear();
                }
            }
        }
    }

    pub fn connection_state(&self, id: &ConnectionId) -> Option<Arc<ConnectionState>> {
        self.connections.lock().get(id).cloned()
    }

    pub fn connection_states(&self) -> Vec<Arc<ConnectionState>> {
        self.connections.lock().values().cloned().collect()
    }

    pub fn cached_message_count(&self) -> usize {
        self.message_cache.lock().len()
    }

    pub fn cached_pull_count(&self) -> usize {
        self.pull_cache.lock().len()
    }

    // -----------------------------------------------------------------------
    // Failover restore
    // -----------------------------------------------------------------------

    /// Replay the registry to a freshly reconnected transport.
    ///
    /// Returns synthesized failure responses for transactions whose one-phase
    /// commit was in flight when the transport dropped: the commit may or may
    /// not have reached the old broker, so the only safe answer to the
    /// waiting caller is a forced rollback. The failover layer dispatches
    /// them like inbound responses.
    pub fn restore(&self, transport: &dyn Transport) -> Result<Vec<Response>, TransportError> {
        let mut in_doubt = Vec::new();

        for state in self.connection_states() {
            debug!(connection = %state.connection_id(), "restoring connection state");
            let mut info = state.info().clone();
            info.failover_reconnect = true;
            transport.oneway(Command::new(CommandPayload::ConnectionInfo(info)))?;

            self.restore_temp_destinations(transport, &state)?;

            if self.config.restore_sessions {
                self.restore_sessions(transport, &state)?;
            }

            if self.config.restore_transactions {
                self.restore_transactions(transport, &state, &mut in_doubt)?;
            }
        }

        let messages = self.message_cache.lock().values_in_order();
        for message in messages {
            transport.oneway(Command::new(CommandPayload::Message(message)))?;
        }

        let pulls = self.pull_cache.lock().values_in_order();
        for pull in pulls {
            transport.oneway(pull)?;
        }

        Ok(in_doubt)
    }

    fn restore_temp_destinations(
        &self,
        transport: &dyn Transport,
        state: &ConnectionState,
    ) -> Result<(), TransportError> {
        for info in state.temp_destinations() {
            transport.oneway(Command::new(CommandPayload::DestinationInfo(info)))?;
        }
        Ok(())
    }

    fn restore_sessions(
        &self,
        transport: &dyn Transport,
        state: &ConnectionState,
    ) -> Result<(), TransportError> {
        for session in state.session_states() {
            transport.oneway(Command::new(CommandPayload::SessionInfo(
                session.info().clone(),
            )))?;

            if self.config.restore_producers {
                self.restore_producers(transport, &session)?;
            }

            if self.config.restore_consumers {
                self.restore_consumers(transport, state, &session)?;
            }
        }
        Ok(())
    }

    fn restore_producers(
        &self,
        transport: &dyn Transport,
        session: &SessionState,
    ) -> Result<(), TransportError> {
        for producer in session.producer_states() {
            transport.oneway(Command::new(CommandPayload::ProducerInfo(
                producer.info().clone(),
            )))?;
        }
        Ok(())
    }

    fn restore_consumers(
        &self,
        transport: &dyn Transport,
        state: &ConnectionState,
        session: &SessionState,
    ) -> Result<(), TransportError> {
        // Until interrupt processing finishes, push consumers are restored
        // pull-only so recovery controls when the backlog resumes flowing.
        let recovery_pending = !state.is_interrupt_processing_complete();

        for consumer in session.consumer_states() {
            let mut info = consumer.info().clone();
            if recovery_pending && info.prefetch_size > 0 {
                state.park_pull_consumer(info.clone());
                info.prefetch_size = 0;
            }
            transport.oneway(Command::new(CommandPayload::ConsumerInfo(info)))?;
        }
        Ok(())
    }

    fn restore_transactions(
        &self,
        transport: &dyn Transport,
        state: &ConnectionState,
        in_doubt: &mut Vec<Response>,
    ) -> Result<(), TransportError> {
        for transaction in state.transaction_states() {
            // A one-phase commit already sent may or may not have landed;
            // force the outcome to rollback instead of replaying it.
            if let Some(last) = transaction.last_command() {
                if let CommandPayload::Transaction(info) = &last.payload {
                    if info.phase == TransactionPhase::CommitOnePhase {
                        warn!(
                            transaction = %info.transaction_id,
                            "transaction completion in doubt after failover, forcing rollback"
                        );
                        in_doubt.push(Response::exception(
                            last.command_id,
                            BrokerFault {
                                exception_class: "TransactionRolledBackException".to_string(),
                                message: format!(
                                    "transaction {} completion in doubt due to failover, forcing rollback",
                                    info.transaction_id
                                ),
                            },
                        ));
                        continue;
                    }
                }
            }

            // Short-lived producers the transaction adopted are recreated for
            // the replay and removed again afterwards.
            for producer in transaction.producer_states() {
                transport.oneway(Command::new(CommandPayload::ProducerInfo(
                    producer.info().clone(),
                )))?;
            }

            for command in transaction.commands() {
                transport.oneway(command)?;
            }

            for producer in transaction.producer_states() {
                transport.oneway(Command::new(CommandPayload::RemoveProducer(
                    producer.info().producer_id.clone(),
                )))?;
            }
        }
        Ok(())
    }

    /// Recovery finished for `connection_id`: re-open the prefetch windows of
    /// consumers restored pull-only. Individual control sends are best
    /// effort.
    pub fn connection_interrupt_processing_complete(
        &self,
        transport: &dyn Transport,
        connection_id: &ConnectionId,
    ) {
        let Some(state) = self.connection_state(connection_id) else {
            return;
        };

        state.set_interrupt_processing_complete(true);
        for info in state.take_recovering_pull_consumers() {
            let control = ConsumerControl {
                consumer_id: info.consumer_id.clone(),
                destination: info.destination.clone(),
                prefetch: info.prefetch_size,
            };
            if let Err(error) =
                transport.oneway(Command::new(CommandPayload::ConsumerControl(control)))
            {
                warn!(
                    consumer = %info.consumer_id,
                    %error,
                    "failed to restore consumer prefetch window"
                );
            }
        }
    }

    /// The transport dropped: recovery is pending again on every connection.
    pub fn transport_interrupted(&self) {
        for state in self.connection_states() {
            state.set_interrupt_processing_complete(false);
        }
    }
}

// ---------------------------------------------------------------------------
// Visitor implementation
// ---------------------------------------------------------------------------

impl CommandVisitor for ConnectionStateTracker {
    type Output = TrackOutcome;

    fn process_connection_info(&self, info: &ConnectionInfo) -> TrackOutcome {
        self.connections.lock().insert(
            info.connection_id.clone(),
            Arc::new(ConnectionState::new(info.clone())),
        );
        Ok(Some(Tracked::new()))
    }

    fn process_remove_connection(&self, id: &ConnectionId) -> TrackOutcome {
        self.connections.lock().remove(id);
        Ok(Some(Tracked::new()))
    }

    fn process_session_info(&self, info: &SessionInfo) -> TrackOutcome {
        if let Some(connection) = self.connection_state(&info.session_id.parent_id()) {
            connection.add_session(info.clone())?;
        }
        Ok(Some(Tracked::new()))
    }

    fn process_remove_session(&self, id: &SessionId) -> TrackOutcome {
        if let Some(connection) = self.connection_state(&id.parent_id()) {
            connection.remove_session(id);
        }
        Ok(Some(Tracked::new()))
    }

    fn process_producer_info(&self, info: &ProducerInfo) -> TrackOutcome {
        let session_id = info.producer_id.parent_id();
        if let Some(connection) = self.connection_state(&session_id.parent_id()) {
            if let Some(session) = connection.session_state(&session_id) {
                session.add_producer(info.clone())?;
            }
        }
        Ok(Some(Tracked::new()))
    }

    fn process_remove_producer(&self, id: &ProducerId) -> TrackOutcome {
        if let Some(connection) = self.connection_state(&id.parent_id().parent_id()) {
            connection.remove_producer(id);
        }
        Ok(Some(Tracked::new()))
    }

    fn process_consumer_info(&self, info: &ConsumerInfo) -> TrackOutcome {
        let session_id = info.consumer_id.parent_id();
        if let Some(connection) = self.connection_state(&session_id.parent_id()) {
            if let Some(session) = connection.session_state(&session_id) {
                session.add_consumer(info.clone())?;
            }
        }
        Ok(Some(Tracked::new()))
    }

    fn process_remove_consumer(&self, id: &ConsumerId) -> TrackOutcome {
        if let Some(connection) = self.connection_state(&id.parent_id().parent_id()) {
            if let Some(session) = connection.session_state(&id.parent_id()) {
                session.remove_consumer(id);
            }
        }
        Ok(Some(Tracked::new()))
    }

    fn process_destination_info(&self, info: &DestinationInfo) -> TrackOutcome {
        if info.destination.is_temporary() {
            if let Some(connection) = self.connection_state(&info.connection_id) {
                connection.add_temp_destination(info.clone())?;
            }
        }
        Ok(Some(Tracked::new()))
    }

    fn process_remove_destination(&self, info: &DestinationInfo) -> TrackOutcome {
        if info.destination.is_temporary() {
            if let Some(connection) = self.connection_state(&info.connection_id) {
                connection.remove_temp_destination(&info.destination);
            }
        }
        Ok(Some(Tracked::new()))
    }

    fn process_transaction(&self, command: &Command, info: &TransactionInfo) -> TrackOutcome {
        if !self.config.track_transactions {
            return Ok(None);
        }

        let Some(connection) = self.connection_state(&info.connection_id) else {
            return Ok(Some(Tracked::new()));
        };

        match info.phase {
            TransactionPhase::Begin => {
                connection.add_transaction_state(info.transaction_id.clone())?;
                if let Some(transaction) = connection.transaction_state(&info.transaction_id) {
                    transaction.add_command(command.clone());
                }
                Ok(Some(Tracked::new()))
            }
            TransactionPhase::Prepare | TransactionPhase::End => {
                if let Some(transaction) = connection.transaction_state(&info.transaction_id) {
                    transaction.add_command(command.clone());
                }
                Ok(Some(Tracked::new()))
            }
            TransactionPhase::CommitOnePhase
            | TransactionPhase::CommitTwoPhase
            | TransactionPhase::Rollback => {
                match connection.transaction_state(&info.transaction_id) {
                    Some(transaction) => {
                        transaction.add_command(command.clone());
                        Ok(Some(Tracked::with_completion(
                            CompletionAction::RemoveTransaction(info.clone()),
                        )))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    fn process_message(&self, command: &Command, message: &Message) -> TrackOutcome {
        if self.config.track_transactions {
            if let Some(transaction_id) = message.transaction_id.clone() {
                let producer_id = message.message_id.producer_id.clone();
                let session_id = producer_id.parent_id();

                if let Some(connection) = self.connection_state(&session_id.parent_id()) {
                    if let Some(transaction) = connection.transaction_state(&transaction_id) {
                        transaction.add_command(command.clone());

                        if self.config.track_transaction_producers {
                            // Remember the enlistment so a producer closed
                            // before commit can be recreated during replay.
                            if let Some(session) = connection.session_state(&session_id) {
                                if let Some(producer) = session.producer_state(&producer_id) {
                                    producer.set_transaction(transaction_id);
                                }
                            }
                        }
                    }
                }
                return Ok(Some(Tracked::new()));
            }
        }

        if self.config.track_messages && message.transaction_id.is_none() {
            self.message_cache.lock().put(message.clone());
        }
        Ok(None)
    }

    fn process_message_pull(&self, pull: &MessagePull) -> TrackOutcome {
        let key = format!("{}::{}", pull.destination.name, pull.consumer_id);
        self.pull_cache.lock().put(
            key,
            Command::new(CommandPayload::MessagePull(pull.clone())),
        );
        Ok(None)
    }

    fn process_message_ack(&self, _ack: &MessageAck) -> TrackOutcome {
        Ok(None)
    }

    fn process_message_dispatch(&self, _dispatch: &MessageDispatch) -> TrackOutcome {
        Ok(None)
    }

    fn process_consumer_control(&self, _control: &ConsumerControl) -> TrackOutcome {
        Ok(None)
    }

    fn process_response(&self, _response: &Response) -> TrackOutcome {
        Ok(None)
    }

    fn process_shutdown(&self) -> TrackOutcome {
        Ok(None)
    }

    fn process_keep_alive(&self) -> TrackOutcome {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
