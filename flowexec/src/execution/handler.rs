//! Exception handlers invoked when a template callback fails.

use super::exception::ProcessingException;
use crate::core::Event;
use std::fmt;
use tracing::{error, warn};

/// Decides what becomes of a failed invocation.
///
/// The returned event becomes the exception's processed event. Calling
/// [`ProcessingException::mark_handled`] turns the failure into a handled
/// outcome; otherwise it propagates to the caller.
#[cfg_attr(test, mockall::automock)]
pub trait ExceptionHandler: Send + Sync {
    /// Handles `exception` raised while processing `event`.
    fn handle_exception(&self, exception: &mut ProcessingException, event: &Event) -> Event;
}

/// Logs the failure and lets it propagate with the error attached to the event.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagateExceptionHandler;

impl ExceptionHandler for PropagateExceptionHandler {
    fn handle_exception(&self, exception: &mut ProcessingException, event: &Event) -> Event {
        error!(
            event_id = %event.id(),
            error_type = %exception.error_type(),
            step = exception.failing_step().unwrap_or("-"),
            error = %exception.cause(),
            "Event processing failed"
        );
        event.clone().with_error(exception.to_event_error())
    }
}

/// Logs the failure and marks it handled; the caller sees a handled outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinueExceptionHandler;

impl ExceptionHandler for ContinueExceptionHandler {
    fn handle_exception(&self, exception: &mut ProcessingException, event: &Event) -> Event {
        warn!(
            event_id = %event.id(),
            error_type = %exception.error_type(),
            error = %exception.cause(),
            "Continuing after failure"
        );
        exception.mark_handled();
        event.clone().with_error(exception.to_event_error())
    }
}

type HandlerFn = dyn Fn(&mut ProcessingException, &Event) -> Event + Send + Sync;

/// A handler backed by a closure.
pub struct FnExceptionHandler {
    func: Box<HandlerFn>,
}

impl FnExceptionHandler {
    /// Wraps `func`.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut ProcessingException, &Event) -> Event + Send + Sync + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnExceptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExceptionHandler").finish_non_exhaustive()
    }
}

impl ExceptionHandler for FnExceptionHandler {
    fn handle_exception(&self, exception: &mut ProcessingException, event: &Event) -> Event {
        (self.func)(exception, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{FlowError, StepError};
    use serde_json::json;

    fn failure() -> (ProcessingException, Event) {
        let event = Event::new(json!({"id": 1}));
        let exception = ProcessingException::new(
            event.clone(),
            FlowError::step("store", StepError::new("db down")),
        );
        (exception, event)
    }

    #[test]
    fn test_propagate_attaches_error_without_handling() {
        let (mut exception, event) = failure();
        let out = PropagateExceptionHandler.handle_exception(&mut exception, &event);

        assert!(!exception.is_handled());
        let error = out.error().unwrap();
        assert_eq!(error.error_type, "step");
        assert_eq!(error.failing_step.as_deref(), Some("store"));
    }

    #[test]
    fn test_continue_marks_handled() {
        let (mut exception, event) = failure();
        let out = ContinueExceptionHandler.handle_exception(&mut exception, &event);
        assert!(exception.is_handled());
        assert!(out.error().is_some());
    }

    #[test]
    fn test_fn_handler_replaces_event() {
        let handler = FnExceptionHandler::new(|exception, _event| {
            exception.mark_handled();
            Event::new(json!("fallback"))
        });
        let (mut exception, event) = failure();
        let out = handler.handle_exception(&mut exception, &event);
        assert_eq!(out.payload(), &json!("fallback"));
        assert!(exception.is_handled());
    }

    #[test]
    fn test_mock_handler_receives_in_flight_event() {
        let (mut exception, event) = failure();
        let expected_id = event.id();

        let mut mock = MockExceptionHandler::new();
        mock.expect_handle_exception()
            .times(1)
            .returning(move |_exception, event| {
                assert_eq!(event.id(), expected_id);
                event.clone().with_variable("seen", json!(true))
            });

        let out = mock.handle_exception(&mut exception, &event);
        assert_eq!(out.variable("seen"), Some(&json!(true)));
    }
}
