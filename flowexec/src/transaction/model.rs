//! The transaction abstraction bound to worker threads.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Stable identity of a transaction, unchanged across suspend/resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generates a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created but `begin` not yet called.
    NotStarted,
    /// Begun and usable.
    Active,
    /// Temporarily detached from its thread.
    Suspended,
    /// Resolved by commit.
    Committed,
    /// Resolved by rollback.
    RolledBack,
}

impl TransactionStatus {
    /// Returns true once the transaction has been committed or rolled back.
    #[must_use]
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// Errors raised by transactions, factories and the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// Fatal misuse such as binding over a different transaction.
    #[error("{0}")]
    Usage(String),

    /// An operation is not valid in the transaction's current status.
    #[error("Transaction {id} cannot {operation} while {status}")]
    IllegalState {
        /// The transaction.
        id: TransactionId,
        /// The attempted operation.
        operation: &'static str,
        /// The status at the time of the attempt.
        status: TransactionStatus,
    },

    /// An enlisted resource failed.
    #[error("Transaction {id} resource failed during {operation}: {message}")]
    Resource {
        /// The transaction.
        id: TransactionId,
        /// The operation being performed.
        operation: &'static str,
        /// The resource's error message.
        message: String,
    },

    /// A factory could not create or join a transaction.
    #[error("Transaction factory failed: {0}")]
    Factory(String),
}

impl TransactionError {
    /// Creates a usage error.
    #[must_use]
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Creates an illegal-state error.
    #[must_use]
    pub fn illegal_state(
        id: TransactionId,
        operation: &'static str,
        status: TransactionStatus,
    ) -> Self {
        Self::IllegalState {
            id,
            operation,
            status,
        }
    }
}

/// A transaction resource with thread-affined state.
///
/// Methods take `&self`; implementations use interior mutability so a
/// transaction can be shared as `Arc<dyn Transaction>` between the registry
/// and the frame that owns it.
pub trait Transaction: Send + Sync + fmt::Debug {
    /// Stable identity.
    fn id(&self) -> TransactionId;

    /// Starts the transaction.
    fn begin(&self) -> Result<(), TransactionError>;

    /// Commits the transaction.
    fn commit(&self) -> Result<(), TransactionError>;

    /// Rolls the transaction back.
    fn rollback(&self) -> Result<(), TransactionError>;

    /// Detaches the transaction from its resources without resolving it.
    fn suspend(&self) -> Result<(), TransactionError>;

    /// Reattaches a suspended transaction.
    fn resume(&self) -> Result<(), TransactionError>;

    /// Marks the transaction so the only possible outcome is rollback.
    fn set_rollback_only(&self) -> Result<(), TransactionError>;

    /// Returns true if the transaction was marked rollback-only.
    fn is_rollback_only(&self) -> bool;

    /// Returns true for XA transactions.
    fn is_xa(&self) -> bool;

    /// Returns the current status.
    fn status(&self) -> TransactionStatus;
}

/// Returns true if both handles refer to the same transaction.
pub(crate) fn same_transaction(a: &dyn Transaction, b: &dyn Transaction) -> bool {
    a.id() == b.id()
}
