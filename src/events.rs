use crate::state::State;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Callback invoked with every state a service enters
pub type StateListener = Arc<dyn Fn(State) + Send + Sync>;

/// Handle identifying a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// State-change broadcast with replay of the current value on subscribe
pub struct StateChannel {
    /// Serializes notification delivery. Reentrant so listeners may read or
    /// drive the service they observe.
    dispatch: ReentrantMutex<()>,
    inner: Mutex<ChannelInner>,
}

struct ChannelInner {
    current: State,
    next_id: u64,
    listeners: Vec<(SubscriptionId, StateListener)>,
    /// States published from inside a listener, delivered after the current one
    pending: VecDeque<State>,
    delivering: bool,
}

/// Clears the delivery flag even if a listener panics
struct Delivery<'a>(&'a Mutex<ChannelInner>);

impl Drop for Delivery<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.lock();
        inner.delivering = false;
        inner.pending.clear();
    }
}

impl StateChannel {
    /// Create a channel whose last known state is `initial`
    pub fn new(initial: State) -> Self {
        Self {
            dispatch: ReentrantMutex::new(()),
            inner: Mutex::new(ChannelInner {
                current: initial,
                next_id: 0,
                listeners: Vec::new(),
                pending: VecDeque::new(),
                delivering: false,
            }),
        }
    }

    /// Hold the delivery order steady across a state change and its notification
    pub(crate) fn dispatch_guard(&self) -> ReentrantMutexGuard<'_, ()> {
        self.dispatch.lock()
    }

    /// Last state delivered on this channel
    pub fn current(&self) -> State {
        self.inner.lock().current
    }

    /// Register a listener.
    ///
    /// The listener is called synchronously with the current state before it
    /// joins the list, so its first notification is always the present state.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(State) + Send + Sync + 'static,
    {
        let _dispatch = self.dispatch.lock();
        let listener: StateListener = Arc::new(listener);

        let current = self.current();
        listener(current);

        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, listener));
        trace!("Listener {:?} subscribed at state {}", id, current);
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id);
        before != inner.listeners.len()
    }

    /// Deliver `state` to every listener and record it as current.
    ///
    /// A publish from inside a listener is queued and delivered once every
    /// listener has seen the state being delivered, so all listeners observe
    /// the same order.
    pub fn publish(&self, state: State) {
        let _dispatch = self.dispatch.lock();

        {
            let mut inner = self.inner.lock();
            inner.pending.push_back(state);
            if inner.delivering {
                trace!("Queued state {} behind the current delivery", state);
                return;
            }
            inner.delivering = true;
        }

        let _delivery = Delivery(&self.inner);
        loop {
            let (state, listeners) = {
                let mut inner = self.inner.lock();
                let state = match inner.pending.pop_front() {
                    Some(state) => state,
                    None => break,
                };
                inner.current = state;
                let listeners: Vec<StateListener> =
                    inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
                (state, listeners)
            };

            debug!("Publishing state {} to {} listeners", state, listeners.len());
            for listener in listeners {
                listener(state);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Subscribe an async receiver. The first received state is the current one.
    pub fn receiver(self: &Arc<Self>) -> StateReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.subscribe(move |state| {
            // A closed receiver unsubscribes itself on drop
            let _ = sender.send(state);
        });

        StateReceiver {
            receiver,
            id,
            channel: Arc::downgrade(self),
        }
    }
}

/// Async stream of state changes, detached from the channel when dropped
pub struct StateReceiver {
    receiver: mpsc::UnboundedReceiver<State>,
    id: SubscriptionId,
    channel: Weak<StateChannel>,
}

impl StateReceiver {
    /// Receive the next state. Returns `None` once the channel is gone and
    /// every buffered state has been read.
    pub async fn recv(&mut self) -> Option<State> {
        self.receiver.recv().await
    }

    /// Receive a buffered state without waiting
    pub fn try_recv(&mut self) -> Option<State> {
        self.receiver.try_recv().ok()
    }

    /// Drain every state received so far
    pub fn drain(&mut self) -> Vec<State> {
        let mut states = Vec::new();
        while let Some(state) = self.try_recv() {
            states.push(state);
        }
        states
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for StateReceiver {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel.unsubscribe(self.id);
        }
    }
}
