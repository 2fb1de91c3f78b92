//! Connection-scoped registry node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::commands::{
    ConnectionId, ConnectionInfo, ConsumerId, ConsumerInfo, Destination, DestinationInfo,
    ProducerId, SessionId, SessionInfo, TransactionId,
};
use crate::state::session::{ProducerState, SessionState};
use crate::state::transaction::TransactionState;
use crate::state::StateError;

/// Session sequence of the implicit connection-scoped session.
pub const DEFAULT_SESSION_SEQUENCE: i64 = -1;

/// Client-side record of one connection and everything registered under it.
///
/// A freshly constructed connection already owns a default session (sequence
/// -1) so connection-scoped producers and consumers have a home without the
/// caller creating a session first.
pub struct ConnectionState {
    info: ConnectionInfo,
    transactions: Mutex<HashMap<TransactionId, Arc<TransactionState>>>,
    sessions: Mutex<HashMap<SessionId, Arc<SessionState>>>,
    /// Creation order is preserved: temporary destinations may reference one
    /// another and must be replayed oldest-first.
    temp_destinations: Mutex<Vec<DestinationInfo>>,
    /// Consumers restored with a zero prefetch while recovery is incomplete,
    /// keyed by id, remembering the original descriptor.
    recovering_pull_consumers: Mutex<HashMap<ConsumerId, ConsumerInfo>>,
    interrupt_processing_complete: AtomicBool,
    disposed: AtomicBool,
}

impl ConnectionState {
    pub fn new(info: ConnectionInfo) -> Self {
        let state = Self {
            info,
            transactions: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            temp_destinations: Mutex::new(Vec::new()),
            recovering_pull_consumers: Mutex::new(HashMap::new()),
            interrupt_processing_complete: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
        };

        let default_id = state.default_session_id();
        state
            .sessions
            .lock()
            .insert(default_id.clone(), Arc::new(SessionState::new(SessionInfo::new(default_id))));

        state
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.info.connection_id
    }

    pub fn default_session_id(&self) -> SessionId {
        SessionId::new(&self.info.connection_id, DEFAULT_SESSION_SEQUENCE)
    }

    /// Fail unless this connection is still live.
    pub fn check_shutdown(&self) -> Result<(), StateError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StateError::Disposed {
                entity: format!("connection {}", self.connection_id()),
            });
        }
        Ok(())
    }

    /// One-way dispose: shuts down every child session. Repeated calls are
    /// no-ops.
    pub fn shutdown(&self) {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            for session in self.session_states() {
                session.shutdown();
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub fn add_session(&self, info: SessionInfo) -> Result<(), StateError> {
        self.check_shutdown()?;
        let id = info.session_id.clone();
        self.sessions
            .lock()
            .insert(id, Arc::new(SessionState::new(info)));
        Ok(())
    }

    /// Detach and return a session; absent ids are not an error.
    pub fn remove_session(&self, id: &SessionId) -> Option<Arc<SessionState>> {
        self.sessions.lock().remove(id)
    }

    pub fn session_state(&self, id: &SessionId) -> Option<Arc<SessionState>> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn session_states(&self) -> Vec<Arc<SessionState>> {
        self.sessions.lock().values().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Producers
    // -----------------------------------------------------------------------

    /// Remove a producer from its owning session, performing the transaction
    /// hand-off for enlisted producers: the producer state is adopted by the
    /// transaction so a rollback can recreate it on the broker, and its
    /// transaction back-reference is cleared.
    pub fn remove_producer(&self, id: &ProducerId) -> Option<Arc<ProducerState>> {
        let session = self.session_state(&id.parent_id())?;
        let producer = session.remove_producer(id)?;
        if let Some(transaction_id) = producer.take_transaction() {
            if let Some(transaction) = self.transaction_state(&transaction_id) {
                transaction.add_producer(Arc::clone(&producer));
            }
        }
        Some(producer)
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    pub fn add_transaction_state(&self, id: TransactionId) -> Result<(), StateError> {
        self.check_shutdown()?;
        self.transactions
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(TransactionState::new(id)));
        Ok(())
    }

    pub fn transaction_state(&self, id: &TransactionId) -> Option<Arc<TransactionState>> {
        self.transactions.lock().get(id).cloned()
    }

    pub fn remove_transaction_state(&self, id: &TransactionId) -> Option<Arc<TransactionState>> {
        self.transactions.lock().remove(id)
    }

    pub fn transaction_states(&self) -> Vec<Arc<TransactionState>> {
        self.transactions.lock().values().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Temporary destinations
    // -----------------------------------------------------------------------

    pub fn add_temp_destination(&self, info: DestinationInfo) -> Result<(), StateError> {
        self.check_shutdown()?;
        self.temp_destinations.lock().push(info);
        Ok(())
    }

    pub fn remove_temp_destination(&self, destination: &Destination) {
        self.temp_destinations
            .lock()
            .retain(|info| &info.destination != destination);
    }

    pub fn temp_destinations(&self) -> Vec<DestinationInfo> {
        self.temp_destinations.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Failover recovery bookkeeping
    // -----------------------------------------------------------------------

    pub fn is_interrupt_processing_complete(&self) -> bool {
        self.interrupt_processing_complete.load(Ordering::SeqCst)
    }

    pub fn set_interrupt_processing_complete(&self, complete: bool) {
        self.interrupt_processing_complete
            .store(complete, Ordering::SeqCst);
    }

    /// Park the original descriptor of a consumer restored in pull-only mode.
    pub fn park_pull_consumer(&self, info: ConsumerInfo) {
        self.recovering_pull_consumers
            .lock()
            .insert(info.consumer_id.clone(), info);
    }

    /// Drain every parked pull consumer.
    pub fn take_recovering_pull_consumers(&self) -> Vec<ConsumerInfo> {
        self.recovering_pull_consumers
            .lock()
            .drain()
            .map(|(_, info)| info)
            .collect()
    }
}
