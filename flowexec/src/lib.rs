//! # Flowexec
//!
//! A runtime that executes ordered pipelines of processing steps on worker
//! pools chosen by each step's declared processing type, with transaction
//! demarcation that stays on the thread owning the transaction.
//!
//! The main pieces:
//!
//! - **Scheduler pools**: light, I/O and intensive pools plus named custom pools
//! - **Processing strategies**: direct, work-queue, event-loop, proactor and
//!   ring-buffer variants mapping steps onto pools
//! - **Transaction registry**: one bound transaction per worker thread
//! - **Execution template**: begin/join/suspend/resolve around an invocation,
//!   with rollback and commit filters and a pluggable exception handler
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowexec::prelude::*;
//!
//! let pipeline = PipelineBuilder::new("orders")
//!     .step(FnStep::new("parse", ProcessingType::Light, parse))
//!     .step(FnStep::new("store", ProcessingType::Blocking, store))
//!     .build()?;
//!
//! let strategy = ProcessingStrategy::with_global_pools(
//!     StrategyConfig::new("orders", StrategyKind::Proactor),
//! )?;
//! let template = ExecutionTemplate::new(
//!     TransactionConfig::new(TransactionAction::BeginOrJoin).with_factory(factory),
//! );
//!
//! let outcome = template.execute_pipeline(&strategy, &pipeline, Event::new(payload));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod execution;
pub mod observability;
pub mod pipeline;
pub mod scheduler;
pub mod strategy;
pub mod testing;
pub mod transaction;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ErrorHandlingConfig, RuntimeConfig};
    pub use crate::core::{Event, EventError, Outcome, ProcessingType};
    pub use crate::errors::{ErrorType, FlowError, StepError};
    pub use crate::execution::{
        ContinueExceptionHandler, ExceptionFilter, ExceptionHandler, ExecutionTemplate,
        FnExceptionHandler, ProcessingException, PropagateExceptionHandler, TransactionFilters,
    };
    pub use crate::observability::{init_tracing, TracingConfig};
    pub use crate::pipeline::{FnStep, Pipeline, PipelineBuilder, PipelineStep};
    pub use crate::scheduler::{PoolConfig, PoolsConfig, RejectionPolicy, SchedulerPools};
    pub use crate::strategy::{
        BackPressureStrategy, Completion, ProcessingStrategy, StrategyConfig, StrategyKind,
        TransactionPolicy,
    };
    pub use crate::transaction::{
        LocalTransactionFactory, Transaction, TransactionAction, TransactionConfig,
        TransactionFactory, TransactionRegistry,
    };
}
