//! Testing utilities for flowexec.
//!
//! This module provides:
//! - Mock steps that record threads, fail, or block on a latch
//! - Recording exception handlers
//! - Pool and transaction fixtures
//! - Assertion helpers

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_committed_once, assert_exception_type, assert_failed_with, assert_handled,
    assert_ran_on_pool, assert_rolled_back_once, assert_single_thread, assert_success,
    assert_unresolved,
};
pub use fixtures::{
    active_transaction, pools_with, saturating_pools, small_pools, test_event,
    FixedTransactionFactory,
};
pub use mocks::{
    trail, FailingStep, HandledCall, Latch, LatchedStep, RecordingExceptionHandler,
    RecordingStep, StepVisit, ThreadRecorder, TRAIL_VARIABLE,
};
