//! Transaction-aware execution of pipeline invocations.
//!
//! An [`ExecutionTemplate`] wraps one invocation in transaction management
//! and routes failures through [`TransactionFilters`] and an
//! [`ExceptionHandler`].

mod exception;
mod filter;
mod handler;
mod template;
#[cfg(test)]
mod template_tests;

pub use exception::ProcessingException;
pub use filter::{ExceptionFilter, TransactionFilters};
pub use handler::{
    ContinueExceptionHandler, ExceptionHandler, FnExceptionHandler, PropagateExceptionHandler,
};
pub use template::ExecutionTemplate;

#[cfg(test)]
pub(crate) use handler::MockExceptionHandler;
