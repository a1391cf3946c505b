use crate::error::{BoxError, Callback, ServiceError};
use async_trait::async_trait;

/// The work a concrete service performs at each lifecycle phase.
///
/// The controller invokes each method at most once, when the matching state is
/// entered. Every default fails with [`ServiceError::NotImplemented`], so a
/// service is unusable until it supplies at least `do_start`.
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    /// Bring the service up. Resolve once it is operational.
    async fn do_start(&self) -> Result<(), BoxError> {
        Err(ServiceError::not_implemented(Callback::Start).into())
    }

    /// Shut down a running service.
    async fn do_stop(&self) -> Result<(), BoxError> {
        Err(ServiceError::not_implemented(Callback::Stop).into())
    }

    /// Undo a startup that was interrupted by `stop()`. Runs after `do_start`
    /// has settled.
    async fn do_cancel(&self) -> Result<(), BoxError> {
        Err(ServiceError::not_implemented(Callback::Cancel).into())
    }

    /// Called synchronously when `stop()` interrupts startup, before
    /// `do_cancel` is scheduled. A `do_start` that watches for this can return
    /// early instead of finishing its work.
    fn cancel_requested(&self) {}
}

/// Dispatch a callback by name
pub(crate) async fn invoke<L: Lifecycle + ?Sized>(
    lifecycle: &L,
    callback: Callback,
) -> Result<(), BoxError> {
    match callback {
        Callback::Start => lifecycle.do_start().await,
        Callback::Stop => lifecycle.do_stop().await,
        Callback::Cancel => lifecycle.do_cancel().await,
    }
}
