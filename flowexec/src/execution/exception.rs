//! The failure record that travels back from a pipeline invocation.

use crate::core::{Event, EventError};
use crate::errors::{ErrorType, FlowError};
use std::fmt;

/// A failure of one invocation, carrying the event that was in flight.
///
/// The processed event starts out as the in-flight event and is replaced by
/// whatever the exception handler returns.
#[derive(Debug)]
pub struct ProcessingException {
    event: Event,
    cause: FlowError,
    failing_step: Option<String>,
    processed_event: Event,
    handled: bool,
}

impl ProcessingException {
    /// Creates an exception for `cause` with `event` in flight.
    #[must_use]
    pub fn new(event: Event, cause: FlowError) -> Self {
        let failing_step = match &cause {
            FlowError::Step { step, .. } | FlowError::StepPanicked { step, .. } => {
                Some(step.clone())
            }
            _ => None,
        };
        Self {
            processed_event: event.clone(),
            event,
            cause,
            failing_step,
            handled: false,
        }
    }

    /// Sets the failing step.
    #[must_use]
    pub fn with_failing_step(mut self, step: impl Into<String>) -> Self {
        self.failing_step = Some(step.into());
        self
    }

    /// The event in flight when the failure happened.
    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// The underlying error.
    #[must_use]
    pub fn cause(&self) -> &FlowError {
        &self.cause
    }

    /// The error type used by exception filters.
    #[must_use]
    pub fn error_type(&self) -> ErrorType {
        self.cause.error_type()
    }

    /// The step that failed, if any.
    #[must_use]
    pub fn failing_step(&self) -> Option<&str> {
        self.failing_step.as_deref()
    }

    /// The event produced by exception handling.
    #[must_use]
    pub fn processed_event(&self) -> &Event {
        &self.processed_event
    }

    /// Replaces the processed event.
    pub fn set_processed_event(&mut self, event: Event) {
        self.processed_event = event;
    }

    /// Marks the failure as handled.
    pub fn mark_handled(&mut self) {
        self.handled = true;
    }

    /// Returns true once a handler has handled the failure.
    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Returns true for misuse errors that bypass exception handling.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        self.cause.is_usage_error()
    }

    /// Builds the [`EventError`] describing this failure.
    #[must_use]
    pub fn to_event_error(&self) -> EventError {
        let error = EventError::new(self.error_type().name(), self.cause.to_string());
        match &self.failing_step {
            Some(step) => error.with_failing_step(step.clone()),
            None => error,
        }
    }

    /// Consumes the exception, returning the processed event.
    #[must_use]
    pub fn into_processed_event(self) -> Event {
        self.processed_event
    }

    /// Consumes the exception, returning its cause.
    #[must_use]
    pub fn into_cause(self) -> FlowError {
        self.cause
    }
}

impl fmt::Display for ProcessingException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Processing failed for event {}", self.event.id())?;
        if let Some(step) = &self.failing_step {
            write!(f, " at step '{step}'")?;
        }
        write!(f, ": {}", self.cause)
    }
}

impl std::error::Error for ProcessingException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}
