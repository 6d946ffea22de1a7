//! Terminal outcome of one execution template invocation.

use super::Event;
use crate::execution::ProcessingException;

/// The three valid completions of one invocation attempt.
#[derive(Debug)]
pub enum Outcome {
    /// The callback succeeded.
    Success(Event),
    /// The callback failed and the exception handler handled it; the event is
    /// the handler's replacement.
    Handled(Event),
    /// The callback failed and the failure propagates. The exception carries
    /// the processed event.
    Failed(Box<ProcessingException>),
}

impl Outcome {
    /// Returns the resulting event: the output, the replacement, or the
    /// processed event of the failure.
    #[must_use]
    pub fn event(&self) -> &Event {
        match self {
            Self::Success(event) | Self::Handled(event) => event,
            Self::Failed(exception) => exception.processed_event(),
        }
    }

    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for `Handled`.
    #[must_use]
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    /// Returns true for `Failed`.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn exception(&self) -> Option<&ProcessingException> {
        match self {
            Self::Failed(exception) => Some(exception),
            _ => None,
        }
    }

    /// Collapses into a result: `Success` and `Handled` are both `Ok`.
    ///
    /// This is how a nested invocation reports back to an enclosing callback.
    pub fn into_result(self) -> Result<Event, ProcessingException> {
        match self {
            Self::Success(event) | Self::Handled(event) => Ok(event),
            Self::Failed(exception) => Err(*exception),
        }
    }
}
