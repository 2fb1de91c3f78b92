//! Transaction-scoped registry node.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::commands::{Command, TransactionId};
use crate::state::session::ProducerState;

/// Client-side record of one in-flight local transaction.
///
/// Holds every command issued under the transaction so a failover can replay
/// the whole unit, plus the producer states handed over by sessions when an
/// enlisted producer was removed before the transaction finished.
pub struct TransactionState {
    id: TransactionId,
    commands: Mutex<Vec<Command>>,
    producers: Mutex<Vec<Arc<ProducerState>>>,
}

impl TransactionState {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            commands: Mutex::new(Vec::new()),
            producers: Mutex::new(Vec::new()),
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.id
    }

    pub fn add_command(&self, command: Command) {
        self.commands.lock().push(command);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    pub fn last_command(&self) -> Option<Command> {
        self.commands.lock().last().cloned()
    }

    /// Adopt a producer removed from its session while still enlisted.
    pub fn add_producer(&self, producer: Arc<ProducerState>) {
        self.producers.lock().push(producer);
    }

    pub fn producer_states(&self) -> Vec<Arc<ProducerState>> {
        self.producers.lock().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
        self.producers.lock().clear();
    }
}
