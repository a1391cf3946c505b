mod controller;
mod handlers;
mod lifecycle;
mod options;
mod phase;

#[cfg(test)]
mod tests;

pub use controller::Service;
pub use lifecycle::Lifecycle;
pub use options::{nop_logger, tracing_logger, Logger, ServiceOptions};
pub use phase::Phase;
