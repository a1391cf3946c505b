use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LifecycleConfig {
    pub service: ServiceConfig,
    pub ticker: TickerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Informational service name used in diagnostics
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Forward every signal and transition to the log at info level
    #[serde(default = "default_trace_transitions")]
    pub trace_transitions: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TickerConfig {
    /// Interval between ticks in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Simulated startup work in milliseconds
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,

    /// How long to wait for the service to reach Running
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,

    /// How long to wait for the service to reach a terminal state
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl TickerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl LifecycleConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("lifecycle.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.trace_transitions", default_trace_transitions())?
            .set_default("ticker.interval_ms", default_interval_ms())?
            .set_default("ticker.start_delay_ms", default_start_delay_ms())?
            .set_default("ticker.start_timeout_secs", default_start_timeout_secs())?
            .set_default("ticker.stop_timeout_secs", default_stop_timeout_secs())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables with LIFECYCLE_ prefix, e.g. LIFECYCLE_TICKER__INTERVAL_MS
            .add_source(
                Environment::with_prefix("LIFECYCLE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: LifecycleConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.name.trim().is_empty() {
            return Err(ConfigError::Message(
                "Service name must not be empty".to_string(),
            ));
        }

        if self.ticker.interval_ms == 0 {
            return Err(ConfigError::Message(
                "Ticker interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.ticker.start_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Ticker start_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.ticker.stop_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Ticker stop_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: default_service_name(),
                trace_transitions: default_trace_transitions(),
            },
            ticker: TickerConfig {
                interval_ms: default_interval_ms(),
                start_delay_ms: default_start_delay_ms(),
                start_timeout_secs: default_start_timeout_secs(),
                stop_timeout_secs: default_stop_timeout_secs(),
            },
        }
    }
}

// Default value functions
fn default_service_name() -> String {
    "ticker".to_string()
}
fn default_trace_transitions() -> bool {
    false
}

fn default_interval_ms() -> u64 {
    1000
}
fn default_start_delay_ms() -> u64 {
    250
}
fn default_start_timeout_secs() -> u64 {
    10
}
fn default_stop_timeout_secs() -> u64 {
    10
}
