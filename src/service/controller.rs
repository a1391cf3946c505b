use super::lifecycle::Lifecycle;
use super::options::{Logger, ServiceOptions};
use super::phase::Phase;
use crate::deferred::Deferred;
use crate::error::{FailureCause, Result, ServiceError};
use crate::events::{StateChannel, StateReceiver, SubscriptionId};
use crate::state::{Signal, State};
use crate::transitions::transition;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// An object with an operational state, plus `start()` and `stop()` to move
/// between states. Examples include web servers, RPC servers and timers.
///
/// The normal lifecycle is New -> Starting -> Running -> Stopping -> Terminated.
/// Calling `stop()` before the service is running diverts it through
/// Cancelling instead, and a failing callback ends it in Failed. Legal
/// transitions form a DAG, so every state is entered at most once, and
/// Terminated and Failed are never left.
///
/// Callbacks run on spawned tokio tasks: `start()` and `stop()` must be called
/// from within a tokio runtime, and fail with [`ServiceError::NoRuntime`]
/// otherwise. Stopping a New service needs no runtime.
pub struct Service<L: Lifecycle> {
    pub(super) inner: Arc<ServiceInner<L>>,
}

pub(super) struct ServiceInner<L> {
    pub(super) id: Uuid,
    pub(super) name: String,
    pub(super) logger: Logger,
    pub(super) lifecycle: Arc<L>,
    pub(super) core: Mutex<Core>,
    pub(super) channel: Arc<StateChannel>,
    pub(super) running_gate: Deferred<(), ServiceError>,
    pub(super) terminal_gate: Deferred<(), ServiceError>,
    /// Settles once the `do_start` outcome has been applied, whatever it was
    pub(super) start_settled: Deferred<(), ()>,
}

pub(super) struct Core {
    pub(super) state: State,
    pub(super) failure: Option<FailureCause>,
}

impl<L: Lifecycle> Service<L> {
    pub fn new(lifecycle: L, options: ServiceOptions) -> Self {
        Self::from_arc(Arc::new(lifecycle), options)
    }

    /// Create a service with a name and the silent default logger
    pub fn with_name(lifecycle: L, name: impl Into<String>) -> Self {
        Self::new(lifecycle, ServiceOptions::new(name))
    }

    pub fn from_arc(lifecycle: Arc<L>, options: ServiceOptions) -> Self {
        let id = Uuid::new_v4();
        debug!("Creating service '{}' ({})", options.name, id);

        Self {
            inner: Arc::new(ServiceInner {
                id,
                name: options.name,
                logger: options.logger,
                lifecycle,
                core: Mutex::new(Core {
                    state: State::New,
                    failure: None,
                }),
                channel: Arc::new(StateChannel::new(State::New)),
                running_gate: Deferred::new(),
                terminal_gate: Deferred::new(),
                start_settled: Deferred::new(),
            }),
        }
    }

    /// Unique id of this controller instance
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn lifecycle(&self) -> &L {
        &self.inner.lifecycle
    }

    /// Current lifecycle state
    pub fn state(&self) -> State {
        self.inner.core.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == State::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == State::Terminated
    }

    /// True once the service is Terminated or Failed
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// The error that drove this service into Failed, if any
    pub fn failure_cause(&self) -> Option<FailureCause> {
        self.inner.core.lock().failure.clone()
    }

    /// Observe state changes. The listener first receives the current state.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(State) + Send + Sync + 'static,
    {
        self.inner.channel.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.channel.unsubscribe(id)
    }

    /// Async stream of state changes, starting with the current state
    pub fn receiver(&self) -> StateReceiver {
        self.inner.channel.receiver()
    }

    /// If the service is New, begin startup and return immediately.
    ///
    /// A stopped service may not be restarted. The returned [`Phase`] resolves
    /// once `do_start` has settled and its follow-up transition is applied.
    pub fn start(&self) -> Result<Phase> {
        let _dispatch = self.inner.channel.dispatch_guard();
        let state = self.state();
        if state != State::New {
            warn!("Service '{}' cannot start from state {}", self.name(), state);
            return Err(ServiceError::IllegalState {
                operation: "start",
                state,
            });
        }

        self.apply(Signal::Start)
    }

    /// Begin shutdown.
    ///
    /// A New service is terminated without any callback. A Starting service is
    /// cancelled through `do_cancel`, a Running one stopped through `do_stop`.
    /// Stopping a terminated service does nothing. Stopping a service that is
    /// already unwinding, or has failed, is an error.
    pub fn stop(&self) -> Result<Phase> {
        self.apply(Signal::Stop)
    }

    /// Wait until the service is Running.
    ///
    /// Fails with the recorded cause if the service fails first, or with
    /// [`ServiceError::Unreachable`] if it terminates without ever running.
    pub async fn running(&self) -> Result<()> {
        let mut gate = self.inner.running_gate.observer();
        gate.wait()
            .await
            .unwrap_or_else(|| Err(ServiceError::GateClosed))
    }

    /// Wait until the service is Terminated or Failed.
    ///
    /// Fails with the recorded cause if the service failed, including for
    /// callers that arrive after the fact.
    pub async fn terminated(&self) -> Result<()> {
        let mut gate = self.inner.terminal_gate.observer();
        gate.wait()
            .await
            .unwrap_or_else(|| Err(ServiceError::GateClosed))
    }

    /// Feed a signal through the transition table and enter the resulting state.
    ///
    /// The state update and its notification happen under the dispatch guard
    /// with no suspension in between.
    pub(crate) fn apply(&self, signal: Signal) -> Result<Phase> {
        let _dispatch = self.inner.channel.dispatch_guard();
        let from = self.state();
        self.log(&format!("fire: {} from {}", signal, from));

        let next = transition(from, signal).map_err(|e| {
            warn!("Service '{}': {}", self.name(), e);
            e
        })?;

        // Entering a phase state spawns its callback, so refuse before any
        // state is committed
        if matches!(next, State::Starting | State::Stopping | State::Cancelling)
            && tokio::runtime::Handle::try_current().is_err()
        {
            warn!("Service '{}' cannot enter {} without a tokio runtime", self.name(), next);
            return Err(ServiceError::NoRuntime { state: next });
        }

        self.log(&format!("setState: {} -> {}", from, next));
        if next == from {
            debug!("Service '{}' already {}", self.name(), next);
            return Ok(Phase::ready());
        }

        self.inner.core.lock().state = next;
        self.inner.channel.publish(next);

        Ok(self.enter(next))
    }

    /// Write-once: the first recorded cause is kept
    pub(super) fn record_failure(&self, cause: FailureCause) {
        let mut core = self.inner.core.lock();
        if core.failure.is_none() {
            core.failure = Some(cause);
        }
    }

    fn log(&self, message: &str) {
        debug!("Service '{}': {}", self.inner.name, message);
        (self.inner.logger)(message);
    }
}

impl<L: Lifecycle> Clone for Service<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: Lifecycle> fmt::Debug for Service<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}
