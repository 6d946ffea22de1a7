//! Error types for the flowexec runtime.
//!
//! Errors fall into four families: pool saturation (`Rejected`, `Overload`),
//! transaction misuse (`TransactionUsage`), transaction-manager failures
//! (`Transaction`) and failures raised by pipeline steps (`Step`). Each
//! variant maps onto an [`ErrorType`] so exception filters can classify it.

use crate::transaction::TransactionError;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A named error type with an optional parent, forming a hierarchy rooted at `any`.
///
/// Exception filters match against the name (exact or wildcard) or against
/// the whole ancestor chain (`name+` patterns).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorType {
    name: Arc<str>,
    parent: Option<Arc<ErrorType>>,
}

impl ErrorType {
    /// Creates a root error type with no parent.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            parent: None,
        }
    }

    /// Creates an error type whose parent is `self`.
    #[must_use]
    pub fn child(&self, name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parent type, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&ErrorType> {
        self.parent.as_deref()
    }

    /// Iterates over this type and then each ancestor up to the root.
    pub fn lineage(&self) -> impl Iterator<Item = &ErrorType> {
        std::iter::successors(Some(self), |t| t.parent())
    }

    /// Returns true if this type is `name` or descends from it.
    #[must_use]
    pub fn is_a(&self, name: &str) -> bool {
        self.lineage().any(|t| t.name() == name)
    }

    /// The root of every error type.
    #[must_use]
    pub fn any() -> Self {
        Self::new("any")
    }

    /// Parent of every error raised by the runtime itself.
    #[must_use]
    pub fn runtime() -> Self {
        Self::any().child("runtime")
    }

    /// Default type of step failures that do not declare their own.
    #[must_use]
    pub fn step() -> Self {
        Self::any().child("step")
    }

    /// A pool refused a submission.
    #[must_use]
    pub fn rejected() -> Self {
        Self::runtime().child("runtime.rejected")
    }

    /// Bounded retries against a saturated pool were exhausted.
    #[must_use]
    pub fn overload() -> Self {
        Self::runtime().child("runtime.overload")
    }

    /// A transaction manager operation failed.
    #[must_use]
    pub fn transaction() -> Self {
        Self::runtime().child("runtime.transaction")
    }

    /// A transaction was used illegally.
    #[must_use]
    pub fn transaction_usage() -> Self {
        Self::transaction().child("runtime.transaction.usage")
    }

    /// Invalid configuration.
    #[must_use]
    pub fn configuration() -> Self {
        Self::runtime().child("runtime.configuration")
    }

    /// The processing strategy was disposed.
    #[must_use]
    pub fn disposed() -> Self {
        Self::runtime().child("runtime.disposed")
    }

    /// A step or callback panicked.
    #[must_use]
    pub fn panic() -> Self {
        Self::runtime().child("runtime.panic")
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Error returned by a pipeline step.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StepError {
    error_type: ErrorType,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl StepError {
    /// Creates a step error of the default `step` type.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_type: ErrorType::step(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a step error with an explicit error type.
    #[must_use]
    pub fn typed(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the error type used for classification.
    #[must_use]
    pub fn error_type(&self) -> &ErrorType {
        &self.error_type
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            error_type: ErrorType::step(),
            message: format!("{err:#}"),
            source: Some(err.into()),
        }
    }
}

/// The main error type for flowexec operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A pool refused a submission because it was saturated.
    #[error("Scheduler '{scheduler}' rejected the task")]
    Rejected {
        /// The scheduler name.
        scheduler: String,
    },

    /// Submission retries against a saturated pool were exhausted.
    #[error("Scheduler '{scheduler}' is overloaded after {attempts} rejected attempts")]
    Overload {
        /// The scheduler (or strategy) that could not accept work.
        scheduler: String,
        /// Consecutive rejections observed before giving up.
        attempts: usize,
    },

    /// A transaction was used illegally. Indicates a configuration bug.
    #[error("Illegal transaction usage: {0}")]
    TransactionUsage(String),

    /// A transaction manager operation failed.
    #[error("Transaction error: {0}")]
    Transaction(TransactionError),

    /// A pipeline step failed.
    #[error("Step '{step}' failed: {source}")]
    Step {
        /// The failing step.
        step: String,
        /// The step's error.
        #[source]
        source: StepError,
    },

    /// A pipeline step panicked.
    #[error("Step '{step}' panicked: {message}")]
    StepPanicked {
        /// The panicking step.
        step: String,
        /// The panic payload, when it was a string.
        message: String,
    },

    /// An execution template callback panicked.
    #[error("Callback panicked: {0}")]
    CallbackPanicked(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The processing strategy has been disposed.
    #[error("Processing strategy disposed: {0}")]
    Disposed(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransactionError> for FlowError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Usage(message) => Self::TransactionUsage(message),
            other => Self::Transaction(other),
        }
    }
}

impl FlowError {
    /// Creates a step failure.
    #[must_use]
    pub fn step(step: impl Into<String>, source: StepError) -> Self {
        Self::Step {
            step: step.into(),
            source,
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns the error type used to classify this error.
    #[must_use]
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::Rejected { .. } => ErrorType::rejected(),
            Self::Overload { .. } => ErrorType::overload(),
            Self::TransactionUsage(_) => ErrorType::transaction_usage(),
            Self::Transaction(_) => ErrorType::transaction(),
            Self::Step { source, .. } => source.error_type().clone(),
            Self::StepPanicked { .. } | Self::CallbackPanicked(_) => ErrorType::panic(),
            Self::Configuration(_) => ErrorType::configuration(),
            Self::Disposed(_) => ErrorType::disposed(),
            Self::Internal(_) => ErrorType::runtime(),
        }
    }

    /// Returns true for fatal misuse that must never be retried or handled.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::TransactionUsage(_) | Self::Configuration(_))
    }

    /// Converts to a JSON diagnostic representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = json!({
            "type": self.error_type().name(),
            "message": self.to_string(),
        });
        match self {
            Self::Overload {
                scheduler,
                attempts,
            } => {
                value["scheduler"] = json!(scheduler);
                value["attempts"] = json!(attempts);
            }
            Self::Rejected { scheduler } => {
                value["scheduler"] = json!(scheduler);
            }
            Self::Step { step, .. } | Self::StepPanicked { step, .. } => {
                value["step"] = json!(step);
            }
            _ => {}
        }
        value
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
