use crate::deferred::Deferred;
use crate::error::{BoxError, Callback};
use crate::service::Lifecycle;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Error produced by a scripted mock callback
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct MockFailure(pub String);

/// Scripted lifecycle for testing controllers without real resources.
///
/// Each callback records its invocation and then waits on a gate the test
/// settles with `complete_*` or `fail_*`. Clones share the same script.
#[derive(Clone)]
pub struct MockLifecycle {
    shared: Arc<MockShared>,
}

struct MockShared {
    calls: Mutex<Vec<Callback>>,
    start: Deferred<(), String>,
    stop: Deferred<(), String>,
    cancel: Deferred<(), String>,
    cancel_requested: AtomicBool,
}

impl MockLifecycle {
    /// A mock whose callbacks block until the test settles them
    pub fn new() -> Self {
        Self {
            shared: Arc::new(MockShared {
                calls: Mutex::new(Vec::new()),
                start: Deferred::new(),
                stop: Deferred::new(),
                cancel: Deferred::new(),
                cancel_requested: AtomicBool::new(false),
            }),
        }
    }

    /// A mock whose callbacks all succeed straight away
    pub fn immediate() -> Self {
        let mock = Self::new();
        mock.complete_start();
        mock.complete_stop();
        mock.complete_cancel();
        mock
    }

    pub fn complete_start(&self) {
        self.shared.start.resolve(());
    }

    pub fn fail_start(&self, message: impl Into<String>) {
        self.shared.start.reject(message.into());
    }

    pub fn complete_stop(&self) {
        self.shared.stop.resolve(());
    }

    pub fn fail_stop(&self, message: impl Into<String>) {
        self.shared.stop.reject(message.into());
    }

    pub fn complete_cancel(&self) {
        self.shared.cancel.resolve(());
    }

    pub fn fail_cancel(&self, message: impl Into<String>) {
        self.shared.cancel.reject(message.into());
    }

    /// Callbacks invoked so far, in order
    pub fn calls(&self) -> Vec<Callback> {
        self.shared.calls.lock().clone()
    }

    pub fn call_count(&self, callback: Callback) -> usize {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|c| **c == callback)
            .count()
    }

    pub fn was_called(&self, callback: Callback) -> bool {
        self.call_count(callback) > 0
    }

    /// Whether the controller announced a cancellation
    pub fn cancel_was_requested(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::Acquire)
    }

    async fn run(&self, callback: Callback, gate: &Deferred<(), String>) -> Result<(), BoxError> {
        self.shared.calls.lock().push(callback);
        debug!("Mock {} invoked", callback);

        match gate.observer().wait().await {
            Some(Ok(())) => Ok(()),
            Some(Err(message)) => Err(Box::new(MockFailure(message))),
            None => Err(Box::new(MockFailure(format!("{} gate dropped", callback)))),
        }
    }
}

impl Default for MockLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Lifecycle for MockLifecycle {
    async fn do_start(&self) -> Result<(), BoxError> {
        self.run(Callback::Start, &self.shared.start).await
    }

    async fn do_stop(&self) -> Result<(), BoxError> {
        self.run(Callback::Stop, &self.shared.stop).await
    }

    async fn do_cancel(&self) -> Result<(), BoxError> {
        self.run(Callback::Cancel, &self.shared.cancel).await
    }

    fn cancel_requested(&self) {
        self.shared.cancel_requested.store(true, Ordering::Release);
    }
}
