//! Transactions and their per-thread binding.
//!
//! - [`TransactionRegistry`]: the thread-affined slot holding the active transaction
//! - [`Transaction`]: the capabilities a transaction exposes
//! - [`LocalTransaction`]: in-process implementation with enlisted resources
//! - [`TransactionConfig`]: what an execution template does with transactions

mod config;
mod local;
mod model;
mod registry;

pub use config::{TransactionAction, TransactionConfig, TransactionFactory, TransactionSettings};
pub use local::{LocalTransaction, LocalTransactionFactory, TransactionResource};
pub use model::{Transaction, TransactionError, TransactionId, TransactionStatus};
pub use registry::TransactionRegistry;
