//! Recording transport for tests and harnesses.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::commands::Command;
use crate::transport::{Transport, TransportError};

/// Transport that records every command instead of sending it.
///
/// `fail_sends` turns every subsequent `oneway` into an I/O failure, which is
/// how send-path error handling is exercised without a socket.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<Command>>,
    failing: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Drain and return everything sent so far.
    pub fn take_commands(&self) -> Vec<Command> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Transport for MockTransport {
    fn oneway(&self, command: Command) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Io("mock transport failing".to_string()));
        }
        self.sent.lock().push(command);
        Ok(())
    }
}
