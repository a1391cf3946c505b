//! The fixed lifecycle transition table.

use crate::error::{Result, ServiceError};
use crate::state::{Signal, State};

const NEW: &[(Signal, State)] = &[
    (Signal::Start, State::Starting),
    (Signal::Stop, State::Terminated),
];

const STARTING: &[(Signal, State)] = &[
    (Signal::Success, State::Running),
    (Signal::Error, State::Failed),
    (Signal::Stop, State::Cancelling),
];

const RUNNING: &[(Signal, State)] = &[(Signal::Stop, State::Stopping)];

const STOPPING: &[(Signal, State)] = &[
    (Signal::Success, State::Terminated),
    (Signal::Error, State::Failed),
];

const CANCELLING: &[(Signal, State)] = &[
    (Signal::Success, State::Terminated),
    (Signal::Error, State::Failed),
];

const TERMINATED: &[(Signal, State)] = &[(Signal::Stop, State::Terminated)];

const FAILED: &[(Signal, State)] = &[];

/// Outgoing transitions of a state, in table order
pub fn transitions_from(state: State) -> &'static [(Signal, State)] {
    match state {
        State::New => NEW,
        State::Starting => STARTING,
        State::Running => RUNNING,
        State::Stopping => STOPPING,
        State::Cancelling => CANCELLING,
        State::Terminated => TERMINATED,
        State::Failed => FAILED,
    }
}

/// Compute the state reached by applying `signal` in `from`
pub fn transition(from: State, signal: Signal) -> Result<State> {
    transitions_from(from)
        .iter()
        .find(|(candidate, _)| *candidate == signal)
        .map(|(_, next)| *next)
        .ok_or_else(|| ServiceError::invalid_transition(from, signal))
}
