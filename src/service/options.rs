use crate::config::ServiceConfig;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Diagnostic sink invoked on every signal application and state transition
pub type Logger = Arc<dyn Fn(&str) + Send + Sync>;

/// Logger that discards everything. This is the default.
pub fn nop_logger() -> Logger {
    Arc::new(|_: &str| {})
}

/// Logger that forwards diagnostics to `tracing` at info level
pub fn tracing_logger(name: impl Into<String>) -> Logger {
    let name = name.into();
    Arc::new(move |message: &str| info!("[{}] {}", name, message))
}

/// Construction options for a [`Service`](super::Service)
#[derive(Clone)]
pub struct ServiceOptions {
    /// Informational name used in diagnostics
    pub name: String,
    pub logger: Logger,
}

impl ServiceOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logger: nop_logger(),
        }
    }

    pub fn with_logger<F>(mut self, logger: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.logger = Arc::new(logger);
        self
    }

    /// Build options from the `[service]` configuration section
    pub fn from_config(config: &ServiceConfig) -> Self {
        let options = Self::new(config.name.clone());
        if config.trace_transitions {
            Self {
                logger: tracing_logger(config.name.clone()),
                ..options
            }
        } else {
            options
        }
    }
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self::new("")
    }
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
