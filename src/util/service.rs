//! Start/stop lifecycle support for stateful components.
//!
//! The lifecycle is tracked with three independent atomic flags rather than
//! one enum so that readers on any thread can observe `started`, `stopping`,
//! and `stopped` without taking a lock. Transitions are compare-and-set
//! guarded, which makes `start`/`stop` idempotent under races.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Failure raised by a lifecycle hook.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ServiceError {
    message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A component with a start/stop lifecycle.
pub trait Service {
    fn start(&self) -> Result<(), ServiceError>;
    fn stop(&self) -> Result<(), ServiceError>;
}

/// Observer of lifecycle transitions.
pub trait ServiceListener: Send + Sync {
    fn on_started(&self);
    fn on_stopped(&self);
}

// ---------------------------------------------------------------------------
// ServiceStopper
// ---------------------------------------------------------------------------

/// Collects the first error raised while stopping a group of sub-resources.
///
/// Stop hooks must tear everything down even when one resource fails, so
/// errors are recorded here instead of short-circuiting and the first one is
/// re-raised once every hook has run.
#[derive(Debug, Default)]
pub struct ServiceStopper {
    first_error: Option<ServiceError>,
}

impl ServiceStopper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop a sub-service, recording its failure instead of propagating.
    pub fn stop_service(&mut self, service: &dyn Service) {
        if let Err(error) = service.stop() {
            self.on_error(error);
        }
    }

    /// Record a failure; only the first one is kept.
    pub fn on_error(&mut self, error: ServiceError) {
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }

    pub fn has_error(&self) -> bool {
        self.first_error.is_some()
    }

    fn into_result(self) -> Result<(), ServiceError> {
        match self.first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceSupport
// ---------------------------------------------------------------------------

/// Lifecycle flags plus listener bookkeeping, embedded by stateful services.
pub struct ServiceSupport {
    started: AtomicBool,
    stopping: AtomicBool,
    stopped: AtomicBool,
    listeners: Mutex<Vec<Arc<dyn ServiceListener>>>,
}

impl Default for ServiceSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceSupport {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            // A service that was never started reads as stopped.
            stopped: AtomicBool::new(true),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn add_listener(&self, listener: Arc<dyn ServiceListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ServiceListener>) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|entry| !Arc::ptr_eq(entry, listener));
    }

    /// Run the start hook if this is the transition out of stopped.
    ///
    /// The hook runs at most once per started interval. On hook failure the
    /// `started` flag is rolled back so a later `start` can retry.
    pub fn start<F>(&self, do_start: F) -> Result<(), ServiceError>
    where
        F: FnOnce() -> Result<(), ServiceError>,
    {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let result = do_start();
        let success = result.is_ok();

        self.stopped.store(!success, Ordering::SeqCst);
        self.started.store(success, Ordering::SeqCst);
        self.stopping.store(false, Ordering::SeqCst);

        if success {
            debug!("service started");
            for listener in self.listeners.lock().iter() {
                listener.on_started();
            }
        }

        result
    }

    /// Run the stop hook if this is the transition into stopped.
    ///
    /// The hook receives a [`ServiceStopper`] to collect per-resource errors;
    /// the service always ends stopped and the first collected error is
    /// re-raised afterwards.
    pub fn stop<F>(&self, do_stop: F) -> Result<(), ServiceError>
    where
        F: FnOnce(&mut ServiceStopper),
    {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        self.stopping.store(true, Ordering::SeqCst);

        let mut stopper = ServiceStopper::new();
        do_stop(&mut stopper);

        self.stopped.store(true, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
        self.stopping.store(false, Ordering::SeqCst);

        debug!(failed = stopper.has_error(), "service stopped");
        for listener in self.listeners.lock().iter() {
            listener.on_stopped();
        }

        stopper.into_result()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_start_hook_runs_once() {
        let support = ServiceSupport::new();
        let runs = AtomicUsize::new(0);

        support
            .start(|| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        support
            .start(|| {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(support.is_started());
        assert!(!support.is_stopped());
    }

    #[test]
    fn test_failed_start_allows_retry() {
        let support = ServiceSupport::new();

        let result = support.start(|| Err(ServiceError::new("no socket")));
        assert!(result.is_err());
        assert!(!support.is_started());
        assert!(support.is_stopped());

        support.start(|| Ok(())).unwrap();
        assert!(support.is_started());
    }

    #[test]
    fn test_stop_hook_runs_once_and_lands_stopped() {
        let support = ServiceSupport::new();
        support.start(|| Ok(())).unwrap();

        let runs = AtomicUsize::new(0);
        support
            .stop(|_| {
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        support
            .stop(|_| {
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!support.is_started());
        assert!(support.is_stopped());
    }

    #[test]
    fn test_stopper_keeps_first_error_only() {
        let support = ServiceSupport::new();
        support.start(|| Ok(())).unwrap();

        let result = support.stop(|stopper| {
            stopper.on_error(ServiceError::new("first"));
            stopper.on_error(ServiceError::new("second"));
        });

        let error = result.unwrap_err();
        assert_eq!(error.to_string(), "first");
        assert!(support.is_stopped());
    }

    #[test]
    fn test_listeners_observe_transitions() {
        struct Counter {
            started: AtomicUsize,
            stopped: AtomicUsize,
        }

        impl ServiceListener for Counter {
            fn on_started(&self) {
                self.started.fetch_add(1, Ordering::SeqCst);
            }
            fn on_stopped(&self) {
                self.stopped.fetch_add(1, Ordering::SeqCst);
            }
        }

        let support = ServiceSupport::new();
        let counter = Arc::new(Counter {
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        });
        support.add_listener(counter.clone());

        support.start(|| Ok(())).unwrap();
        support.stop(|_| {}).unwrap();

        assert_eq!(counter.started.load(Ordering::SeqCst), 1);
        assert_eq!(counter.stopped.load(Ordering::SeqCst), 1);

        let listener: Arc<dyn ServiceListener> = counter.clone();
        support.remove_listener(&listener);
        support.start(|| Ok(())).unwrap();
        assert_eq!(counter.started.load(Ordering::SeqCst), 1);
    }
}
