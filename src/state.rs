use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a service.
///
/// The declaration order follows the legal transitions: if `A -> B` is a valid
/// transition then `A < B`. The converse does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum State {
    /// Inactive, never started
    New,
    /// Transitioning to `Running`
    Starting,
    /// Operational
    Running,
    /// Transitioning to `Terminated`
    Stopping,
    /// Stopped before it became operational, transitioning to `Terminated`
    Cancelling,
    /// Completed execution normally
    Terminated,
    /// Encountered a problem and may not be operational
    Failed,
}

impl State {
    pub const ALL: [State; 7] = [
        State::New,
        State::Starting,
        State::Running,
        State::Stopping,
        State::Cancelling,
        State::Terminated,
        State::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::New => "New",
            State::Starting => "Starting",
            State::Running => "Running",
            State::Stopping => "Stopping",
            State::Cancelling => "Cancelling",
            State::Terminated => "Terminated",
            State::Failed => "Failed",
        }
    }

    /// Terminated and Failed have no way out
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Terminated | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs consumed by the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Start,
    Stop,
    Success,
    Error,
}

impl Signal {
    pub const ALL: [Signal; 4] = [Signal::Start, Signal::Stop, Signal::Success, Signal::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Start => "start",
            Signal::Stop => "stop",
            Signal::Success => "success",
            Signal::Error => "error",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
