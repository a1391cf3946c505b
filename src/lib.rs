pub mod config;
pub mod deferred;
pub mod error;
pub mod events;
pub mod mock;
pub mod service;
pub mod state;
pub mod ticker;
pub mod transitions;

pub use config::LifecycleConfig;
pub use deferred::{Deferred, Settled};
pub use error::{BoxError, Callback, FailureCause, Result, ServiceError};
pub use events::{StateChannel, StateListener, StateReceiver, SubscriptionId};
pub use mock::{MockFailure, MockLifecycle};
pub use service::{nop_logger, tracing_logger, Lifecycle, Logger, Phase, Service, ServiceOptions};
pub use state::{Signal, State};
pub use ticker::{TickerError, TickerService};
pub use transitions::{transition, transitions_from};
