use super::controller::Service;
use super::lifecycle::{invoke, Lifecycle};
use super::phase::Phase;
use crate::error::{Callback, FailureCause, Result, ServiceError};
use crate::state::{Signal, State};
use std::sync::Arc;
use tracing::{debug, error, info};

impl<L: Lifecycle> Service<L> {
    /// State-entry handler, run once when `state` is newly entered
    pub(super) fn enter(&self, state: State) -> Phase {
        match state {
            State::New => Phase::ready(),
            State::Starting => self.spawn_phase(Callback::Start, State::Starting),
            State::Stopping => self.spawn_phase(Callback::Stop, State::Stopping),
            State::Cancelling => {
                self.inner.lifecycle.cancel_requested();
                self.spawn_phase(Callback::Cancel, State::Cancelling)
            }
            State::Running => {
                info!("Service '{}' is running", self.name());
                self.inner.running_gate.resolve(());
                Phase::ready()
            }
            State::Terminated => {
                info!("Service '{}' terminated", self.name());
                self.inner.terminal_gate.resolve(());
                self.inner.running_gate.reject(ServiceError::Unreachable {
                    target: State::Running,
                    reached: State::Terminated,
                });
                Phase::ready()
            }
            State::Failed => {
                let cause = self.failure_cause().unwrap_or_else(|| {
                    FailureCause::msg(format!("service '{}' failed", self.name()))
                });
                error!("Service '{}' failed: {}", self.name(), cause);
                self.inner
                    .terminal_gate
                    .reject(ServiceError::Failure(cause.clone()));
                self.inner.running_gate.reject(ServiceError::Failure(cause));
                Phase::ready()
            }
        }
    }

    /// Run `callback` on a task and feed its outcome back as a signal
    fn spawn_phase(&self, callback: Callback, phase: State) -> Phase {
        let service = self.clone();

        let handle = tokio::spawn(async move {
            if callback == Callback::Cancel {
                // Cancellation is cooperative: let the in-flight start settle first
                debug!("Service '{}' waiting for do_start before cancelling", service.name());
                let _ = service.inner.start_settled.observer().wait().await;
            }

            let outcome = service.run_callback(callback).await;
            let completed = service.complete_phase(phase, callback, outcome);

            // Released only after the start outcome is recorded, so the cancel
            // phase sees a do_start failure
            if callback == Callback::Start {
                service.inner.start_settled.resolve(());
            }

            completed
        });

        Phase::pending(callback, handle)
    }

    /// Invoke the user callback on its own task so a panic becomes a failure
    async fn run_callback(&self, callback: Callback) -> std::result::Result<(), FailureCause> {
        debug!("Service '{}' invoking {}", self.name(), callback);
        let lifecycle = Arc::clone(&self.inner.lifecycle);

        let task = tokio::spawn(async move { invoke(&*lifecycle, callback).await });

        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FailureCause::from(e)),
            Err(e) => Err(FailureCause::new(ServiceError::CallbackPanicked {
                callback,
                message: e.to_string(),
            })),
        }
    }

    fn complete_phase(
        &self,
        phase: State,
        callback: Callback,
        outcome: std::result::Result<(), FailureCause>,
    ) -> Result<()> {
        let _dispatch = self.inner.channel.dispatch_guard();
        let current = self.state();

        // stop() moved a starting service on to Cancelling; the cancel phase
        // now owns the follow-up signal
        if current != phase {
            return match outcome {
                Ok(()) => {
                    debug!(
                        "Service '{}' finished {} after moving to {}",
                        self.name(),
                        callback,
                        current
                    );
                    Ok(())
                }
                Err(cause) => {
                    error!(
                        "Service '{}' {} failed while {}: {}",
                        self.name(),
                        callback,
                        current,
                        cause
                    );
                    self.record_failure(cause.clone());
                    Err(ServiceError::Failure(cause))
                }
            };
        }

        match outcome {
            Ok(()) => match self.failure_cause() {
                // do_start failed after stop() diverted it; the cancel still
                // ran but the service ends Failed
                Some(cause) => {
                    debug!(
                        "Service '{}' {} succeeded after an earlier failure",
                        self.name(),
                        callback
                    );
                    self.apply(Signal::Error)?;
                    Err(ServiceError::Failure(cause))
                }
                None => {
                    debug!("Service '{}' {} succeeded", self.name(), callback);
                    self.apply(Signal::Success)?;
                    Ok(())
                }
            },
            Err(cause) => {
                error!("Service '{}' {} failed: {}", self.name(), callback, cause);
                self.record_failure(cause.clone());
                self.apply(Signal::Error)?;
                Err(ServiceError::Failure(cause))
            }
        }
    }
}
