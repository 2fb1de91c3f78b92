//! Request/response correlation over a one-way transport.
//!
//! The correlator stamps outbound commands with a monotonically increasing
//! command id, keeps a pending future per `response_required` request, and
//! resolves futures as the transport-reader thread hands inbound responses
//! back. A transport failure fails every outstanding request instead of
//! leaving its issuer blocked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::commands::{BrokerFault, Command, CommandPayload, Response};
use crate::transport::future_response::{FutureResponse, ResponseCallback};
use crate::transport::{Transport, TransportError};

struct CorrelatorState {
    pending: HashMap<i32, Arc<FutureResponse>>,
    /// Latched first failure; once set, new requests fail immediately.
    failure: Option<TransportError>,
}

/// Correlation layer that makes a one-way transport answer requests.
pub struct ResponseCorrelator<T: Transport> {
    next: T,
    next_command_id: AtomicI32,
    state: Mutex<CorrelatorState>,
}

impl<T: Transport> ResponseCorrelator<T> {
    pub fn new(next: T) -> Self {
        Self {
            next,
            next_command_id: AtomicI32::new(1),
            state: Mutex::new(CorrelatorState {
                pending: HashMap::new(),
                failure: None,
            }),
        }
    }

    pub fn inner(&self) -> &T {
        &self.next
    }

    fn stamp(&self, command: &mut Command, response_required: bool) {
        command.command_id = self.next_command_id.fetch_add(1, Ordering::SeqCst);
        command.response_required = response_required;
    }

    /// Register a pending future for `command_id` unless a failure is
    /// latched, in which case the latched error is returned.
    fn register(
        &self,
        command_id: i32,
        future: &Arc<FutureResponse>,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }
        state.pending.insert(command_id, Arc::clone(future));
        Ok(())
    }

    fn unregister(&self, command_id: i32) {
        self.state.lock().pending.remove(&command_id);
    }

    /// Fire-and-forget send.
    pub fn oneway(&self, mut command: Command) -> Result<(), TransportError> {
        self.stamp(&mut command, false);
        self.next.oneway(command)
    }

    /// Send and block until the broker answers.
    pub fn request(&self, command: Command) -> Result<Response, TransportError> {
        self.request_inner(command, None)
    }

    /// Send and block up to `timeout` for the answer.
    pub fn request_timeout(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        self.request_inner(command, Some(timeout))
    }

    fn request_inner(
        &self,
        mut command: Command,
        timeout: Option<Duration>,
    ) -> Result<Response, TransportError> {
        self.stamp(&mut command, true);
        let command_id = command.command_id;

        let future = Arc::new(FutureResponse::new());
        self.register(command_id, &future)?;

        if let Err(error) = self.next.oneway(command) {
            self.unregister(command_id);
            return Err(error);
        }

        let response = match timeout {
            None => future.response(),
            Some(timeout) => future.response_timeout(timeout),
        };
        self.unregister(command_id);

        response.ok_or(TransportError::NoResponse { command_id })
    }

    /// Send without blocking; the returned future resolves when the broker
    /// answers. An optional callback fires on the resolving thread.
    pub fn async_request(
        &self,
        mut command: Command,
        callback: Option<ResponseCallback>,
    ) -> Result<Arc<FutureResponse>, TransportError> {
        self.stamp(&mut command, true);
        let command_id = command.command_id;

        let future = Arc::new(match callback {
            Some(callback) => FutureResponse::with_callback(callback),
            None => FutureResponse::new(),
        });

        if let Err(error) = self.register(command_id, &future) {
            // Resolve the future so no holder of the handle blocks forever.
            future.set_response(Response::exception(
                command_id,
                BrokerFault {
                    exception_class: "TransportError".to_string(),
                    message: error.to_string(),
                },
            ));
            return Err(error);
        }

        if let Err(error) = self.next.oneway(command) {
            self.unregister(command_id);
            return Err(error);
        }

        Ok(future)
    }

    /// Route an inbound command.
    ///
    /// Responses are consumed by resolving their pending future; anything
    /// else is handed back for dispatch so outstanding requests never stall
    /// control traffic.
    pub fn on_command(&self, command: Command) -> Option<Command> {
        match command.payload {
            CommandPayload::Response(response) => {
                let future = self.state.lock().pending.remove(&response.correlation_id);
                match future {
                    Some(future) => future.set_response(response),
                    None => {
                        debug!(
                            correlation_id = response.correlation_id,
                            "dropping response with no outstanding request"
                        );
                    }
                }
                None
            }
            _ => Some(command),
        }
    }

    /// Fail every outstanding request and latch `error` so later requests
    /// fail immediately. Only the first failure is kept.
    pub fn dispose(&self, error: TransportError) {
        let drained: Vec<(i32, Arc<FutureResponse>)> = {
            let mut state = self.state.lock();
            if state.failure.is_some() {
                return;
            }
            state.failure = Some(error.clone());
            state.pending.drain().collect()
        };

        if !drained.is_empty() {
            warn!(
                outstanding = drained.len(),
                %error,
                "failing outstanding requests"
            );
        }

        for (command_id, future) in drained {
            future.set_response(Response::exception(
                command_id,
                BrokerFault {
                    exception_class: "TransportError".to_string(),
                    message: error.to_string(),
                },
            ));
        }
    }

    /// Dispose with the closed error; all later requests fail fast.
    pub fn close(&self) {
        self.dispose(TransportError::Closed);
    }

    /// Number of requests still waiting on a response.
    pub fn outstanding(&self) -> usize {
        self.state.lock().pending.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
