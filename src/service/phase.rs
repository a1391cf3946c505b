use crate::error::{Callback, Result, ServiceError};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

/// Outcome of the lifecycle phase started by `start()` or `stop()`.
///
/// The phase runs whether or not this handle is awaited; dropping it only
/// discards the outcome. Awaiting it yields the callback failure, if any.
pub struct Phase {
    inner: PhaseInner,
}

enum PhaseInner {
    Ready(Option<Result<()>>),
    Pending {
        callback: Callback,
        handle: JoinHandle<Result<()>>,
    },
}

impl Phase {
    /// A phase that needed no callback
    pub(crate) fn ready() -> Self {
        Self {
            inner: PhaseInner::Ready(Some(Ok(()))),
        }
    }

    pub(crate) fn pending(callback: Callback, handle: JoinHandle<Result<()>>) -> Self {
        Self {
            inner: PhaseInner::Pending { callback, handle },
        }
    }

    /// The callback this phase runs, if any
    pub fn callback(&self) -> Option<Callback> {
        match &self.inner {
            PhaseInner::Ready(_) => None,
            PhaseInner::Pending { callback, .. } => Some(*callback),
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.inner {
            PhaseInner::Ready(_) => true,
            PhaseInner::Pending { handle, .. } => handle.is_finished(),
        }
    }
}

impl Future for Phase {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            PhaseInner::Ready(outcome) => Poll::Ready(outcome.take().unwrap_or(Ok(()))),
            PhaseInner::Pending { callback, handle } => {
                let callback = *callback;
                Pin::new(handle).poll(cx).map(|joined| {
                    joined.unwrap_or_else(|e| {
                        Err(ServiceError::CallbackPanicked {
                            callback,
                            message: e.to_string(),
                        })
                    })
                })
            }
        }
    }
}
