//! Session-scoped registry nodes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::commands::{ConsumerId, ConsumerInfo, ProducerId, ProducerInfo, SessionId, SessionInfo, TransactionId};
use crate::state::StateError;

/// Client-side record of one producer registered on the broker.
///
/// The enlisting transaction is referenced by id only; ownership flows
/// strictly parent to child, so recovering the full transaction state goes
/// through the connection's registry.
pub struct ProducerState {
    info: ProducerInfo,
    transaction: Mutex<Option<TransactionId>>,
}

impl ProducerState {
    pub fn new(info: ProducerInfo) -> Self {
        Self {
            info,
            transaction: Mutex::new(None),
        }
    }

    pub fn info(&self) -> &ProducerInfo {
        &self.info
    }

    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction.lock().clone()
    }

    pub fn set_transaction(&self, transaction_id: TransactionId) {
        *self.transaction.lock() = Some(transaction_id);
    }

    /// Clear and return the enlisting transaction id.
    pub fn take_transaction(&self) -> Option<TransactionId> {
        self.transaction.lock().take()
    }
}

/// Client-side record of one consumer registered on the broker.
pub struct ConsumerState {
    info: ConsumerInfo,
}

impl ConsumerState {
    pub fn new(info: ConsumerInfo) -> Self {
        Self { info }
    }

    pub fn info(&self) -> &ConsumerInfo {
        &self.info
    }
}

/// Client-side record of one session and the producers/consumers it owns.
pub struct SessionState {
    info: SessionInfo,
    producers: Mutex<HashMap<ProducerId, Arc<ProducerState>>>,
    consumers: Mutex<HashMap<ConsumerId, Arc<ConsumerState>>>,
    disposed: AtomicBool,
}

impl SessionState {
    pub fn new(info: SessionInfo) -> Self {
        Self {
            info,
            producers: Mutex::new(HashMap::new()),
            consumers: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn session_id(&self) -> &SessionId {
        &self.info.session_id
    }

    /// Fail unless this session is still live.
    pub fn check_shutdown(&self) -> Result<(), StateError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StateError::Disposed {
                entity: format!("session {}", self.session_id()),
            });
        }
        Ok(())
    }

    pub fn add_producer(&self, info: ProducerInfo) -> Result<(), StateError> {
        self.check_shutdown()?;
        let id = info.producer_id.clone();
        self.producers
            .lock()
            .insert(id, Arc::new(ProducerState::new(info)));
        Ok(())
    }

    /// Detach and return a producer; absent ids are not an error.
    ///
    /// Transaction hand-off for enlisted producers happens one level up, on
    /// the connection, where the transaction state is reachable.
    pub fn remove_producer(&self, id: &ProducerId) -> Option<Arc<ProducerState>> {
        self.producers.lock().remove(id)
    }

    pub fn producer_state(&self, id: &ProducerId) -> Option<Arc<ProducerState>> {
        self.producers.lock().get(id).cloned()
    }

    pub fn producer_states(&self) -> Vec<Arc<ProducerState>> {
        self.producers.lock().values().cloned().collect()
    }

    pub fn add_consumer(&self, info: ConsumerInfo) -> Result<(), StateError> {
        self.check_shutdown()?;
        let id = info.consumer_id.clone();
        self.consumers
            .lock()
            .insert(id, Arc::new(ConsumerState::new(info)));
        Ok(())
    }

    pub fn remove_consumer(&self, id: &ConsumerId) -> Option<Arc<ConsumerState>> {
        self.consumers.lock().remove(id)
    }

    pub fn consumer_state(&self, id: &ConsumerId) -> Option<Arc<ConsumerState>> {
        self.consumers.lock().get(id).cloned()
    }

    pub fn consumer_states(&self) -> Vec<Arc<ConsumerState>> {
        self.consumers.lock().values().cloned().collect()
    }

    /// One-way dispose; repeated calls are no-ops.
    pub fn shutdown(&self) {
        let _ = self
            .disposed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{ConnectionId, Destination};

    fn session_state() -> SessionState {
        let connection = ConnectionId::new("conn");
        SessionState::new(SessionInfo::new(SessionId::new(&connection, 1)))
    }

    #[test]
    fn test_add_and_remove_producer() {
        let session = session_state();
        let producer_id = ProducerId::new(session.session_id(), 1);
        session
            .add_producer(ProducerInfo::new(producer_id.clone()))
            .unwrap();

        assert!(session.producer_state(&producer_id).is_some());
        assert!(session.remove_producer(&producer_id).is_some());
        assert!(session.remove_producer(&producer_id).is_none());
    }

    #[test]
    fn test_disposed_session_rejects_mutation() {
        let session = session_state();
        session.shutdown();
        session.shutdown();

        let producer_id = ProducerId::new(session.session_id(), 1);
        let result = session.add_producer(ProducerInfo::new(producer_id));
        assert!(matches!(result, Err(StateError::Disposed { .. })));

        let consumer_id = ConsumerId::new(session.session_id(), 1);
        let result = session.add_consumer(ConsumerInfo::new(
            consumer_id,
            Destination::queue("orders"),
        ));
        assert!(matches!(result, Err(StateError::Disposed { .. })));
    }
}
