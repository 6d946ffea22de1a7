//! Transaction-aware invocation of a unit of work.
//!
//! One call to [`ExecutionTemplate::execute`] is a frame. A frame resolves
//! only the transaction it began itself; a joined transaction is at most
//! marked rollback-only and a suspended one is always resumed untouched.

use super::exception::ProcessingException;
use super::filter::TransactionFilters;
use super::handler::{ExceptionHandler, PropagateExceptionHandler};
use crate::core::{Event, Outcome};
use crate::errors::{panic_message, FlowError};
use crate::pipeline::Pipeline;
use crate::strategy::ProcessingStrategy;
use crate::transaction::{
    Transaction, TransactionAction, TransactionConfig, TransactionRegistry, TransactionStatus,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// How the frame relates to the transaction its callback runs in.
enum Binding {
    /// No transaction.
    Unbound,
    /// An outer frame's transaction; never resolved here.
    Joined(Arc<dyn Transaction>),
    /// Begun by this frame; resolved and unbound here.
    Owned(Arc<dyn Transaction>),
}

/// Restores the thread's outer transaction state when the frame ends, even
/// if the exception handler panics.
#[derive(Default)]
struct FrameGuard {
    suspended: Option<Arc<dyn Transaction>>,
    external: Option<Arc<dyn Transaction>>,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.suspended.take() {
            let id = tx.id();
            if let Err(err) = TransactionRegistry::resume(tx) {
                error!(tx = %id, error = %err, "Failed to resume suspended transaction");
            }
        }
        if let Some(tx) = self.external.take() {
            if let Err(err) = TransactionRegistry::unbind(tx.as_ref()) {
                warn!(tx = %tx.id(), error = %err, "Failed to unbind external transaction");
            }
        }
    }
}

/// Wraps invocations in transaction management and exception handling.
pub struct ExecutionTemplate {
    config: TransactionConfig,
    handler: Arc<dyn ExceptionHandler>,
    filters: TransactionFilters,
}

impl ExecutionTemplate {
    /// Creates a template with the propagating exception handler and no filters.
    #[must_use]
    pub fn new(config: TransactionConfig) -> Self {
        Self {
            config,
            handler: Arc::new(PropagateExceptionHandler),
            filters: TransactionFilters::default(),
        }
    }

    /// Sets the exception handler.
    #[must_use]
    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Sets the rollback and commit filters.
    #[must_use]
    pub fn with_filters(mut self, filters: TransactionFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Returns the transaction configuration.
    #[must_use]
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Returns the filters.
    #[must_use]
    pub fn filters(&self) -> &TransactionFilters {
        &self.filters
    }

    /// Runs `callback` with `event` inside one frame.
    ///
    /// Misuse (invalid configuration, joining without a transaction, a
    /// transaction where none is allowed) fails without reaching the
    /// exception handler. Every other failure is classified, the frame's
    /// transaction is resolved accordingly and the handler decides whether
    /// the outcome is `Handled` or `Failed`.
    pub fn execute<F>(&self, event: Event, callback: F) -> Outcome
    where
        F: FnOnce(Event) -> Result<Event, ProcessingException>,
    {
        if let Err(err) = self.config.validate() {
            return Outcome::Failed(Box::new(ProcessingException::new(event, err)));
        }

        let mut guard = FrameGuard::default();
        let binding = match self.enter(&mut guard) {
            Ok(binding) => binding,
            Err(err) => return self.handle(ProcessingException::new(event, err)),
        };

        let result = match catch_unwind(AssertUnwindSafe(|| callback(event.clone()))) {
            Ok(result) => result,
            Err(payload) => Err(ProcessingException::new(
                event,
                FlowError::CallbackPanicked(panic_message(payload.as_ref())),
            )),
        };

        let result = match result {
            Ok(output) => self.complete(&binding, output),
            Err(exception) => {
                self.resolve_failure(&binding, &exception);
                Err(exception)
            }
        };

        if let Binding::Owned(tx) = &binding {
            if let Err(err) = TransactionRegistry::unbind(tx.as_ref()) {
                warn!(tx = %tx.id(), error = %err, "Failed to unbind owned transaction");
            }
        }

        let outcome = match result {
            Ok(output) => Outcome::Success(output),
            Err(exception) => self.handle(exception),
        };
        drop(guard);
        outcome
    }

    /// Runs `pipeline` through `strategy` inside one frame.
    pub fn execute_pipeline(
        &self,
        strategy: &ProcessingStrategy,
        pipeline: &Pipeline,
        event: Event,
    ) -> Outcome {
        self.execute(event, |event| strategy.process(pipeline, event))
    }

    fn enter(&self, guard: &mut FrameGuard) -> Result<Binding, FlowError> {
        if self.config.interact_with_external && !TransactionRegistry::is_active() {
            if let Some(factory) = &self.config.factory {
                if let Some(tx) = factory.join_external_transaction()? {
                    TransactionRegistry::bind(tx.clone())?;
                    debug!(tx = %tx.id(), "Joined external transaction");
                    guard.external = Some(tx);
                }
            }
        }

        let action = self.config.action;
        let current = TransactionRegistry::current();
        match (action, current) {
            (TransactionAction::None, Some(_)) => {
                guard.suspended = TransactionRegistry::suspend()?;
                Ok(Binding::Unbound)
            }
            (TransactionAction::AlwaysBegin, Some(_)) => {
                guard.suspended = TransactionRegistry::suspend()?;
                self.begin()
            }
            (
                TransactionAction::AlwaysJoin
                | TransactionAction::BeginOrJoin
                | TransactionAction::Indifferent
                | TransactionAction::JoinIfPossible,
                Some(tx),
            ) => {
                debug!(tx = %tx.id(), %action, "Joining transaction");
                Ok(Binding::Joined(tx))
            }
            (TransactionAction::Never, Some(tx)) => Err(FlowError::TransactionUsage(format!(
                "transaction {} is active but action {action} forbids transactions",
                tx.id()
            ))),
            (TransactionAction::AlwaysJoin, None) => Err(FlowError::TransactionUsage(format!(
                "action {action} requires an active transaction but none is bound"
            ))),
            (TransactionAction::AlwaysBegin | TransactionAction::BeginOrJoin, None) => self.begin(),
            (TransactionAction::Indifferent, None) if self.config.factory.is_some() => {
                self.begin()
            }
            (
                TransactionAction::None
                | TransactionAction::Indifferent
                | TransactionAction::JoinIfPossible
                | TransactionAction::Never,
                None,
            ) => Ok(Binding::Unbound),
        }
    }

    fn begin(&self) -> Result<Binding, FlowError> {
        let factory = self.config.factory.as_ref().ok_or_else(|| {
            FlowError::configuration(format!(
                "transaction action {} requires a transaction factory",
                self.config.action
            ))
        })?;
        let tx = factory.begin_transaction()?;
        if let Err(err) = TransactionRegistry::bind(tx.clone()) {
            if let Err(rollback_err) = tx.rollback() {
                warn!(tx = %tx.id(), error = %rollback_err, "Rollback of unbindable transaction failed");
            }
            return Err(err.into());
        }
        debug!(tx = %tx.id(), xa = tx.is_xa(), "Began transaction");
        Ok(Binding::Owned(tx))
    }

    /// Resolves an owned transaction after the callback succeeded.
    fn complete(&self, binding: &Binding, output: Event) -> Result<Event, ProcessingException> {
        let Binding::Owned(tx) = binding else {
            return Ok(output);
        };
        let resolution = if tx.is_rollback_only() {
            debug!(tx = %tx.id(), "Rolling back rollback-only transaction");
            tx.rollback()
        } else {
            tx.commit()
        };
        match resolution {
            Ok(()) => Ok(output),
            Err(err) => {
                error!(tx = %tx.id(), error = %err, "Failed to resolve transaction");
                rollback_if_active(tx.as_ref());
                Err(ProcessingException::new(output, err.into()))
            }
        }
    }

    /// Applies the rollback/commit classification to the frame's transaction.
    fn resolve_failure(&self, binding: &Binding, exception: &ProcessingException) {
        let error_type = exception.error_type();
        let rollback = self.filters.should_rollback(&error_type);
        match binding {
            Binding::Unbound => {}
            Binding::Joined(tx) => {
                if rollback {
                    debug!(tx = %tx.id(), %error_type, "Marking joined transaction rollback-only");
                    if let Err(err) = tx.set_rollback_only() {
                        warn!(tx = %tx.id(), error = %err, "Failed to mark transaction rollback-only");
                    }
                }
            }
            Binding::Owned(tx) => {
                let resolution = if rollback {
                    debug!(tx = %tx.id(), %error_type, "Rolling back after failure");
                    tx.rollback()
                } else {
                    debug!(tx = %tx.id(), %error_type, "Committing after failure");
                    tx.commit()
                };
                if let Err(err) = resolution {
                    error!(tx = %tx.id(), error = %err, "Failed to resolve transaction after failure");
                    rollback_if_active(tx.as_ref());
                }
            }
        }
    }

    fn handle(&self, mut exception: ProcessingException) -> Outcome {
        if exception.is_usage_error() {
            error!(error = %exception.cause(), "Illegal usage, skipping exception handler");
            return Outcome::Failed(Box::new(exception));
        }
        let in_flight = exception.event().clone();
        let processed = self.handler.handle_exception(&mut exception, &in_flight);
        exception.set_processed_event(processed);
        if exception.is_handled() {
            Outcome::Handled(exception.into_processed_event())
        } else {
            Outcome::Failed(Box::new(exception))
        }
    }
}

impl std::fmt::Debug for ExecutionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionTemplate")
            .field("config", &self.config)
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}

fn rollback_if_active(tx: &dyn Transaction) {
    if tx.status() == TransactionStatus::Active {
        if let Err(err) = tx.rollback() {
            error!(tx = %tx.id(), error = %err, "Rollback after failed resolution also failed");
        }
    }
}
