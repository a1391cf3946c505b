use super::*;
use crate::error::{BoxError, Callback, ServiceError};
use crate::mock::{MockFailure, MockLifecycle};
use crate::state::{Signal, State};
use crate::transitions::transitions_from;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

const WAIT: Duration = Duration::from_secs(2);

fn record_states<L: Lifecycle>(service: &Service<L>) -> Arc<Mutex<Vec<State>>> {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    service.subscribe(move |state| sink.lock().push(state));
    states
}

async fn within<F: Future>(future: F) -> F::Output {
    timeout(WAIT, future).await.expect("timed out waiting for service")
}

fn failure_message(err: &ServiceError) -> String {
    match err {
        ServiceError::Failure(cause) => cause.to_string(),
        other => panic!("Expected a callback failure, got {:?}", other),
    }
}

/// Lifecycle that overrides nothing
struct BareLifecycle;

impl Lifecycle for BareLifecycle {}

struct PanickingLifecycle;

#[async_trait]
impl Lifecycle for PanickingLifecycle {
    async fn do_start(&self) -> Result<(), BoxError> {
        panic!("start exploded");
    }
}

#[tokio::test]
async fn test_fresh_service_is_new() {
    let service = Service::with_name(MockLifecycle::new(), "fresh");
    let states = record_states(&service);

    assert_eq!(service.state(), State::New);
    assert_eq!(service.name(), "fresh");
    assert!(!service.is_running());
    assert!(!service.is_stopped());
    assert!(service.failure_cause().is_none());
    assert_eq!(*states.lock(), vec![State::New]);
}

#[tokio::test]
async fn test_start_transitions_to_running() {
    let mock = MockLifecycle::immediate();
    let service = Service::with_name(mock.clone(), "starter");
    let states = record_states(&service);

    let phase = service.start().unwrap();
    assert_eq!(phase.callback(), Some(Callback::Start));
    assert_eq!(service.state(), State::Starting);

    within(service.running()).await.unwrap();
    within(phase).await.unwrap();

    assert!(service.is_running());
    assert_eq!(*states.lock(), vec![State::New, State::Starting, State::Running]);
    assert_eq!(mock.calls(), vec![Callback::Start]);

    // The running gate settled exactly once, and later waiters still pass
    assert!(!service.inner.running_gate.resolve(()));
    within(service.running()).await.unwrap();
}

#[tokio::test]
async fn test_start_from_non_new_state_is_illegal() {
    let service = Service::with_name(MockLifecycle::immediate(), "twice");
    let _ = service.start().unwrap();

    match service.start() {
        Err(ServiceError::IllegalState { operation, state }) => {
            assert_eq!(operation, "start");
            assert_eq!(state, State::Starting);
        }
        other => panic!("Expected IllegalState, got {:?}", other.err()),
    }

    within(service.running()).await.unwrap();
    assert!(service.start().is_err());
    assert_eq!(service.lifecycle().call_count(Callback::Start), 1);
}

#[tokio::test]
async fn test_start_failure_transitions_to_failed() {
    let mock = MockLifecycle::new();
    let service = Service::with_name(mock.clone(), "fails-to-start");
    let states = record_states(&service);

    let phase = service.start().unwrap();
    mock.fail_start("test error");

    let err = within(phase).await.unwrap_err();
    assert_eq!(failure_message(&err), "test error");

    let terminal = within(service.terminated()).await.unwrap_err();
    assert_eq!(failure_message(&terminal), "test error");

    let running = within(service.running()).await.unwrap_err();
    assert_eq!(failure_message(&running), "test error");

    assert_eq!(*states.lock(), vec![State::New, State::Starting, State::Failed]);

    let cause = service.failure_cause().expect("failure cause recorded");
    assert_eq!(
        cause.downcast_ref::<MockFailure>(),
        Some(&MockFailure("test error".to_string()))
    );
    assert!(terminal.failure_cause().unwrap().ptr_eq(&cause));
}

#[tokio::test]
async fn test_late_waiters_observe_failure() {
    let mock = MockLifecycle::new();
    mock.fail_start("early failure");
    let service = Service::with_name(mock, "late");

    let _ = service.start().unwrap();
    let _ = within(service.terminated()).await;
    assert_eq!(service.state(), State::Failed);

    // Arriving after the fact must not hang
    let again = within(service.terminated()).await.unwrap_err();
    assert_eq!(failure_message(&again), "early failure");

    let states = record_states(&service);
    assert_eq!(*states.lock(), vec![State::Failed]);
}

#[tokio::test]
async fn test_stop_during_starting_cancels() {
    let mock = MockLifecycle::new();
    let service = Service::with_name(mock.clone(), "cancelled");
    let states = record_states(&service);

    let start = service.start().unwrap();
    tokio::task::yield_now().await;

    assert!(!mock.cancel_was_requested());
    let stop = service.stop().unwrap();
    assert_eq!(stop.callback(), Some(Callback::Cancel));
    assert_eq!(service.state(), State::Cancelling);
    assert!(mock.cancel_was_requested());

    // do_cancel waits for the in-flight do_start
    tokio::task::yield_now().await;
    assert!(!mock.was_called(Callback::Cancel));

    mock.complete_start();
    mock.complete_cancel();

    within(service.terminated()).await.unwrap();
    within(start).await.unwrap();
    within(stop).await.unwrap();

    assert_eq!(
        *states.lock(),
        vec![State::New, State::Starting, State::Cancelling, State::Terminated]
    );
    assert_eq!(mock.calls(), vec![Callback::Start, Callback::Cancel]);
    assert!(!mock.was_called(Callback::Stop));

    match within(service.running()).await {
        Err(ServiceError::Unreachable { target, reached }) => {
            assert_eq!(target, State::Running);
            assert_eq!(reached, State::Terminated);
        }
        other => panic!("Expected Unreachable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_failure_transitions_to_failed() {
    let mock = MockLifecycle::new();
    let service = Service::with_name(mock.clone(), "bad-cancel");
    let states = record_states(&service);

    let _ = service.start().unwrap();
    let stop = service.stop().unwrap();
    mock.complete_start();
    mock.fail_cancel("cancel error");

    let err = within(stop).await.unwrap_err();
    assert_eq!(failure_message(&err), "cancel error");

    let terminal = within(service.terminated()).await.unwrap_err();
    assert_eq!(failure_message(&terminal), "cancel error");
    assert_eq!(
        *states.lock(),
        vec![State::New, State::Starting, State::Cancelling, State::Failed]
    );
}

#[tokio::test]
async fn test_start_failure_while_cancelling_fails_service() {
    let mock = MockLifecycle::new();
    let service = Service::with_name(mock.clone(), "start-fails-late");
    let states = record_states(&service);

    let start = service.start().unwrap();
    let stop = service.stop().unwrap();
    mock.fail_start("start error");
    mock.complete_cancel();

    let err = within(start).await.unwrap_err();
    assert_eq!(failure_message(&err), "start error");

    // do_cancel still runs, but the start failure decides the outcome
    let err = within(stop).await.unwrap_err();
    assert_eq!(failure_message(&err), "start error");

    let terminal = within(service.terminated()).await.unwrap_err();
    assert_eq!(failure_message(&terminal), "start error");

    assert_eq!(service.state(), State::Failed);
    assert_eq!(service.failure_cause().unwrap().to_string(), "start error");
    assert_eq!(
        *states.lock(),
        vec![State::New, State::Starting, State::Cancelling, State::Failed]
    );
    assert_eq!(mock.calls(), vec![Callback::Start, Callback::Cancel]);
}

#[tokio::test]
async fn test_start_and_cancel_failures_keep_first_cause() {
    let mock = MockLifecycle::new();
    let service = Service::with_name(mock.clone(), "both-fail");

    let _ = service.start().unwrap();
    let stop = service.stop().unwrap();
    mock.fail_start("start error");
    mock.fail_cancel("cancel error");

    let err = within(stop).await.unwrap_err();
    assert_eq!(failure_message(&err), "cancel error");

    let terminal = within(service.terminated()).await.unwrap_err();
    assert_eq!(failure_message(&terminal), "start error");
    assert_eq!(service.state(), State::Failed);
}

#[tokio::test]
async fn test_stop_on_new_terminates_without_callbacks() {
    let mock = MockLifecycle::immediate();
    let service = Service::with_name(mock.clone(), "never-started");
    let states = record_states(&service);

    let phase = service.stop().unwrap();
    assert!(phase.is_finished());
    assert_eq!(phase.callback(), None);
    within(phase).await.unwrap();

    within(service.terminated()).await.unwrap();
    assert!(service.is_stopped());
    assert_eq!(*states.lock(), vec![State::New, State::Terminated]);
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_stop_is_idempotent_once_terminated() {
    let service = Service::with_name(MockLifecycle::immediate(), "idempotent");
    let states = record_states(&service);

    within(service.stop().unwrap()).await.unwrap();
    within(service.stop().unwrap()).await.unwrap();
    within(service.stop().unwrap()).await.unwrap();

    assert_eq!(service.state(), State::Terminated);
    assert_eq!(*states.lock(), vec![State::New, State::Terminated]);
}

#[tokio::test]
async fn test_full_lifecycle() {
    let mock = MockLifecycle::immediate();
    let service = Service::with_name(mock.clone(), "happy");
    let states = record_states(&service);

    within(service.start().unwrap()).await.unwrap();
    within(service.running()).await.unwrap();

    let stop = service.stop().unwrap();
    assert_eq!(stop.callback(), Some(Callback::Stop));
    within(stop).await.unwrap();
    within(service.terminated()).await.unwrap();

    assert_eq!(
        *states.lock(),
        vec![
            State::New,
            State::Starting,
            State::Running,
            State::Stopping,
            State::Terminated
        ]
    );
    assert_eq!(mock.calls(), vec![Callback::Start, Callback::Stop]);
    assert!(service.failure_cause().is_none());
}

#[tokio::test]
async fn test_failure_during_stopping() {
    let mock = MockLifecycle::new();
    mock.complete_start();
    let service = Service::with_name(mock.clone(), "bad-stop");
    let states = record_states(&service);

    let _ = service.start().unwrap();
    within(service.running()).await.unwrap();

    let stop = service.stop().unwrap();
    mock.fail_stop("test error");

    let err = within(stop).await.unwrap_err();
    assert_eq!(failure_message(&err), "test error");

    let terminal = within(service.terminated()).await.unwrap_err();
    assert_eq!(failure_message(&terminal), "test error");

    assert_eq!(
        *states.lock(),
        vec![
            State::New,
            State::Starting,
            State::Running,
            State::Stopping,
            State::Failed
        ]
    );
    assert!(!mock.was_called(Callback::Cancel));
    assert_eq!(service.failure_cause().unwrap().to_string(), "test error");

    // A failed service cannot be stopped again
    assert!(matches!(
        service.stop(),
        Err(ServiceError::InvalidTransition {
            from: State::Failed,
            signal: Signal::Stop
        })
    ));
}

fn assert_undefined_signals_rejected<L: Lifecycle>(service: &Service<L>, expected: State) {
    assert_eq!(service.state(), expected);

    for signal in Signal::ALL {
        if transitions_from(expected).iter().any(|(s, _)| *s == signal) {
            continue;
        }

        match service.apply(signal) {
            Err(ServiceError::InvalidTransition { from, signal: rejected }) => {
                assert_eq!(from, expected);
                assert_eq!(rejected, signal);
            }
            other => panic!(
                "Expected InvalidTransition for {} in {}, got {:?}",
                signal,
                expected,
                other.err()
            ),
        }
        assert_eq!(service.state(), expected, "state changed after {}", signal);
    }
}

#[tokio::test]
async fn test_undefined_signals_leave_state_unchanged() {
    let fresh = Service::with_name(MockLifecycle::new(), "new");
    assert_undefined_signals_rejected(&fresh, State::New);

    let starting = Service::with_name(MockLifecycle::new(), "starting");
    let _ = starting.start().unwrap();
    assert_undefined_signals_rejected(&starting, State::Starting);

    let running = Service::with_name(MockLifecycle::immediate(), "running");
    let _ = running.start().unwrap();
    within(running.running()).await.unwrap();
    assert_undefined_signals_rejected(&running, State::Running);

    let stopping_mock = MockLifecycle::new();
    stopping_mock.complete_start();
    let stopping = Service::with_name(stopping_mock, "stopping");
    let _ = stopping.start().unwrap();
    within(stopping.running()).await.unwrap();
    let _ = stopping.stop().unwrap();
    assert_undefined_signals_rejected(&stopping, State::Stopping);

    let cancelling = Service::with_name(MockLifecycle::new(), "cancelling");
    let _ = cancelling.start().unwrap();
    let _ = cancelling.stop().unwrap();
    assert_undefined_signals_rejected(&cancelling, State::Cancelling);

    let terminated = Service::with_name(MockLifecycle::new(), "terminated");
    let _ = terminated.stop().unwrap();
    assert_undefined_signals_rejected(&terminated, State::Terminated);

    let failed_mock = MockLifecycle::new();
    failed_mock.fail_start("boom");
    let failed = Service::with_name(failed_mock, "failed");
    let _ = failed.start().unwrap();
    let _ = within(failed.terminated()).await;
    assert_undefined_signals_rejected(&failed, State::Failed);
}

#[tokio::test]
async fn test_missing_callback_is_not_implemented() {
    let service = Service::with_name(BareLifecycle, "bare");

    let err = within(service.start().unwrap()).await.unwrap_err();
    let cause = err.failure_cause().expect("callback failure");
    assert!(matches!(
        cause.downcast_ref::<ServiceError>(),
        Some(ServiceError::NotImplemented {
            callback: Callback::Start
        })
    ));
    assert_eq!(service.state(), State::Failed);
}

#[tokio::test]
async fn test_panicking_callback_fails_service() {
    let service = Service::with_name(PanickingLifecycle, "panics");

    let err = within(service.start().unwrap()).await.unwrap_err();
    let cause = err.failure_cause().expect("callback failure");
    assert!(matches!(
        cause.downcast_ref::<ServiceError>(),
        Some(ServiceError::CallbackPanicked {
            callback: Callback::Start,
            ..
        })
    ));
    assert!(within(service.terminated()).await.is_err());
    assert_eq!(service.state(), State::Failed);
}

#[tokio::test]
async fn test_logger_sees_signals_and_transitions() {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    let options = ServiceOptions::new("logged")
        .with_logger(move |message| sink.lock().push(message.to_string()));

    let service = Service::new(MockLifecycle::immediate(), options);
    let _ = service.stop().unwrap();

    assert_eq!(
        *messages.lock(),
        vec![
            "fire: stop from New".to_string(),
            "setState: New -> Terminated".to_string()
        ]
    );
}

#[tokio::test]
async fn test_receiver_streams_states_in_order() {
    let service = Service::with_name(MockLifecycle::immediate(), "streamed");
    let mut receiver = service.receiver();

    let _ = service.start().unwrap();
    within(service.running()).await.unwrap();
    let _ = service.stop().unwrap();
    within(service.terminated()).await.unwrap();

    assert_eq!(
        receiver.drain(),
        vec![
            State::New,
            State::Starting,
            State::Running,
            State::Stopping,
            State::Terminated
        ]
    );
}

#[tokio::test]
async fn test_listener_can_stop_service() {
    let mock = MockLifecycle::immediate();
    let service = Service::with_name(mock.clone(), "self-stopping");
    let states = record_states(&service);

    let handle = service.clone();
    service.subscribe(move |state| {
        if state == State::Running {
            let _ = handle.stop();
        }
    });

    let _ = service.start().unwrap();
    within(service.terminated()).await.unwrap();

    assert_eq!(
        *states.lock(),
        vec![
            State::New,
            State::Starting,
            State::Running,
            State::Stopping,
            State::Terminated
        ]
    );
    assert_eq!(mock.calls(), vec![Callback::Start, Callback::Stop]);
}

#[tokio::test]
async fn test_listener_stopping_ahead_of_others_keeps_order() {
    let mock = MockLifecycle::immediate();
    let service = Service::with_name(mock.clone(), "stopper-first");

    let handle = service.clone();
    service.subscribe(move |state| {
        if state == State::Running {
            let _ = handle.stop();
        }
    });
    let states = record_states(&service);
    let mut receiver = service.receiver();

    let _ = service.start().unwrap();
    within(service.terminated()).await.unwrap();

    let expected = vec![
        State::New,
        State::Starting,
        State::Running,
        State::Stopping,
        State::Terminated,
    ];
    assert_eq!(*states.lock(), expected);
    assert_eq!(receiver.drain(), expected);
}

#[test]
fn test_start_outside_runtime_is_refused() {
    let mock = MockLifecycle::immediate();
    let service = Service::with_name(mock.clone(), "no-runtime");
    let states = record_states(&service);

    match service.start() {
        Err(ServiceError::NoRuntime { state }) => assert_eq!(state, State::Starting),
        other => panic!("Expected NoRuntime, got {:?}", other.err()),
    }
    assert_eq!(service.state(), State::New);
    assert!(mock.calls().is_empty());

    // Stopping a New service runs no callback, so it works anywhere
    let phase = service.stop().unwrap();
    assert!(phase.is_finished());
    assert_eq!(service.state(), State::Terminated);
    assert_eq!(*states.lock(), vec![State::New, State::Terminated]);
}
