//! One-shot response slot bridging the reader thread and request issuers.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::commands::Response;

/// Callback invoked on the resolving thread once a response is stored.
pub type ResponseCallback = Box<dyn Fn(&Response) + Send + Sync>;

struct ResponseSlot {
    response: Option<Response>,
    completed: bool,
}

/// A response that will arrive later.
///
/// Created before the request is transmitted, resolved exactly once by the
/// transport-reader thread, awaited by the issuing thread and anyone else
/// holding the handle. Resolving an already-resolved future is a no-op.
pub struct FutureResponse {
    slot: Mutex<ResponseSlot>,
    complete: Condvar,
    callback: Option<ResponseCallback>,
}

impl Default for FutureResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl FutureResponse {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(ResponseSlot {
                response: None,
                completed: false,
            }),
            complete: Condvar::new(),
            callback: None,
        }
    }

    /// A future that invokes `callback` synchronously on the resolving
    /// thread after the value is stored.
    pub fn with_callback(callback: ResponseCallback) -> Self {
        Self {
            callback: Some(callback),
            ..Self::new()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.slot.lock().completed
    }

    /// Block until the future resolves.
    pub fn response(&self) -> Option<Response> {
        let mut slot = self.slot.lock();
        while !slot.completed {
            self.complete.wait(&mut slot);
        }
        slot.response.clone()
    }

    /// Block up to `timeout` for resolution; returns whatever is stored,
    /// which is `None` when the wait timed out.
    pub fn response_timeout(&self, timeout: Duration) -> Option<Response> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while !slot.completed {
            if Instant::now() >= deadline {
                break;
            }
            if self.complete.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        slot.response.clone()
    }

    /// Store the response and release every waiter. At most one call takes
    /// effect; later calls are no-ops.
    pub fn set_response(&self, response: Response) {
        {
            let mut slot = self.slot.lock();
            if slot.completed {
                return;
            }
            slot.response = Some(response.clone());
            slot.completed = true;
            self.complete.notify_all();
        }
        if let Some(callback) = &self.callback {
            callback(&response);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
