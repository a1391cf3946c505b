use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

/// One-shot settleable value with settlement control kept apart from waiting.
///
/// The first `resolve`/`reject` wins; later attempts are discarded. Waiters
/// obtained through [`Deferred::observer`] suspend until the value is settled,
/// and observers created afterwards see the settled value immediately.
pub struct Deferred<T, E> {
    shared: Arc<Shared<T, E>>,
}

struct Shared<T, E> {
    slot: watch::Sender<Option<Result<T, E>>>,
    /// Set once a settlement has been claimed, including by `adopt`
    claimed: AtomicBool,
}

impl<T, E> Shared<T, E> {
    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    fn fill(&self, outcome: Result<T, E>) {
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                slot,
                claimed: AtomicBool::new(false),
            }),
        }
    }

    /// Resolve with `value`. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject with `reason`. Returns false if already settled.
    pub fn reject(&self, reason: E) -> bool {
        self.settle(Err(reason))
    }

    pub fn settle(&self, outcome: Result<T, E>) -> bool {
        if !self.shared.claim() {
            trace!("Deferred already settled, ignoring settlement");
            return false;
        }
        self.shared.fill(outcome);
        true
    }

    /// Lock this deferred to the eventual outcome of `pending`.
    ///
    /// The computation is driven on a spawned task, so this must be called from
    /// within a tokio runtime. Returns false (and drops `pending`) if the
    /// deferred was already settled or adopting.
    pub fn adopt<F>(&self, pending: F) -> bool
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        if !self.shared.claim() {
            trace!("Deferred already settled, ignoring adopted computation");
            return false;
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let outcome = pending.await;
            shared.fill(outcome);
        });
        true
    }

    /// Whether a value has been stored
    pub fn is_settled(&self) -> bool {
        self.shared.slot.borrow().is_some()
    }

    /// Current settled value, if any
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.shared.slot.borrow().clone()
    }

    /// A waiter that can be handed out without settlement rights
    pub fn observer(&self) -> Settled<T, E> {
        Settled {
            slot: self.shared.slot.subscribe(),
        }
    }
}

impl<T, E> Default for Deferred<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of a [`Deferred`]
#[derive(Clone)]
pub struct Settled<T, E> {
    slot: watch::Receiver<Option<Result<T, E>>>,
}

impl<T, E> Settled<T, E>
where
    T: Clone,
    E: Clone,
{
    /// Suspend until the deferred settles.
    ///
    /// Returns `None` if the deferred was dropped without ever settling.
    pub async fn wait(&mut self) -> Option<Result<T, E>> {
        self.slot
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|settled| settled.clone())
    }

    pub fn peek(&self) -> Option<Result<T, E>> {
        self.slot.borrow().clone()
    }
}
