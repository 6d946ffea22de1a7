//! Assertion helpers for outcomes, transactions and thread placement.

use crate::core::{Event, Outcome};
use crate::execution::ProcessingException;
use crate::transaction::LocalTransaction;

use super::mocks::ThreadRecorder;

/// Asserts that the outcome is a success and returns its event.
///
/// # Panics
///
/// Panics if the outcome is not `Success`.
#[track_caller]
pub fn assert_success(outcome: &Outcome) -> &Event {
    match outcome {
        Outcome::Success(event) => event,
        other => panic!("Expected success, got {other:?}"),
    }
}

/// Asserts that the outcome was handled and returns the replacement event.
///
/// # Panics
///
/// Panics if the outcome is not `Handled`.
#[track_caller]
pub fn assert_handled(outcome: &Outcome) -> &Event {
    match outcome {
        Outcome::Handled(event) => event,
        other => panic!("Expected handled failure, got {other:?}"),
    }
}

/// Asserts that the outcome failed with an error of (or descending from) `error_type`.
///
/// # Panics
///
/// Panics if the outcome did not fail or failed with another type.
#[track_caller]
pub fn assert_failed_with<'a>(outcome: &'a Outcome, error_type: &str) -> &'a ProcessingException {
    let Some(exception) = outcome.exception() else {
        panic!("Expected failure of type '{error_type}', got {outcome:?}");
    };
    assert_exception_type(exception, error_type);
    exception
}

/// Asserts that a failure is of (or descends from) `error_type`.
///
/// # Panics
///
/// Panics on mismatch.
#[track_caller]
pub fn assert_exception_type(exception: &ProcessingException, error_type: &str) {
    assert!(
        exception.error_type().is_a(error_type),
        "Expected error type '{error_type}', got '{}' ({})",
        exception.error_type().name(),
        exception.cause()
    );
}

/// Asserts that `tx` was committed exactly once and never rolled back.
///
/// # Panics
///
/// Panics otherwise.
#[track_caller]
pub fn assert_committed_once(tx: &LocalTransaction) {
    assert_eq!(
        (tx.commit_count(), tx.rollback_count()),
        (1, 0),
        "Expected one commit and no rollback for {tx:?}"
    );
}

/// Asserts that `tx` was rolled back exactly once and never committed.
///
/// # Panics
///
/// Panics otherwise.
#[track_caller]
pub fn assert_rolled_back_once(tx: &LocalTransaction) {
    assert_eq!(
        (tx.commit_count(), tx.rollback_count()),
        (0, 1),
        "Expected one rollback and no commit for {tx:?}"
    );
}

/// Asserts that nobody resolved `tx`.
///
/// # Panics
///
/// Panics if it was committed or rolled back.
#[track_caller]
pub fn assert_unresolved(tx: &LocalTransaction) {
    assert_eq!(
        (tx.commit_count(), tx.rollback_count()),
        (0, 0),
        "Expected {tx:?} to stay unresolved"
    );
}

/// Asserts that `step` ran on a thread of the pool `pool`.
///
/// # Panics
///
/// Panics if the step never ran or ran elsewhere.
#[track_caller]
pub fn assert_ran_on_pool(recorder: &ThreadRecorder, step: &str, pool: &str) {
    let visit = recorder
        .visits()
        .into_iter()
        .find(|v| v.step == step)
        .unwrap_or_else(|| panic!("Step '{step}' never ran"));
    assert_eq!(
        visit.pool(),
        pool,
        "Step '{step}' ran on thread '{}', expected pool '{pool}'",
        visit.thread
    );
}

/// Asserts that every step ran on the same thread.
///
/// # Panics
///
/// Panics if more than one thread was used.
#[track_caller]
pub fn assert_single_thread(recorder: &ThreadRecorder) -> String {
    let threads = recorder.distinct_threads();
    assert_eq!(threads.len(), 1, "Expected a single thread, got {threads:?}");
    threads.into_iter().next().unwrap_or_default()
}
