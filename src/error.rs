use crate::state::{Signal, State};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by lifecycle callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The three user-supplied lifecycle callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    Start,
    Stop,
    Cancel,
}

impl Callback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Callback::Start => "do_start",
            Callback::Stop => "do_stop",
            Callback::Cancel => "do_cancel",
        }
    }
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("No valid transition for signal '{signal}' from state '{from}'")]
    InvalidTransition { from: State, signal: Signal },

    #[error("Cannot {operation} from state {state}")]
    IllegalState { operation: &'static str, state: State },

    #[error("Lifecycle callback {callback} is not implemented")]
    NotImplemented { callback: Callback },

    #[error(transparent)]
    Failure(FailureCause),

    #[error("Lifecycle callback {callback} panicked: {message}")]
    CallbackPanicked { callback: Callback, message: String },

    #[error("Service reached {reached} and will never become {target}")]
    Unreachable { target: State, reached: State },

    #[error("Lifecycle gate dropped before it was settled")]
    GateClosed,

    #[error("Cannot enter {state} outside a tokio runtime")]
    NoRuntime { state: State },
}

impl ServiceError {
    pub fn invalid_transition(from: State, signal: Signal) -> Self {
        Self::InvalidTransition { from, signal }
    }

    pub fn not_implemented(callback: Callback) -> Self {
        Self::NotImplemented { callback }
    }

    /// The recorded failure cause, if this error carries one
    pub fn failure_cause(&self) -> Option<&FailureCause> {
        match self {
            ServiceError::Failure(cause) => Some(cause),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Shared, cloneable handle to the error that drove a service into `Failed`.
///
/// Every waiter on a failed service observes the same underlying error, so the
/// cause is reference counted rather than copied.
#[derive(Clone)]
pub struct FailureCause(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl FailureCause {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Build a cause from a plain message
    pub fn msg<S: Into<String>>(message: S) -> Self {
        let message: String = message.into();
        let boxed: BoxError = message.into();
        Self::from(boxed)
    }

    /// Attempt to view the underlying error as a concrete type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Whether both handles point at the same recorded error
    pub fn ptr_eq(&self, other: &FailureCause) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<BoxError> for FailureCause {
    fn from(error: BoxError) -> Self {
        Self(Arc::from(error))
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for FailureCause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}
