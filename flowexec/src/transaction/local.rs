//! In-process transaction implementation.

use super::config::TransactionFactory;
use super::model::{Transaction, TransactionError, TransactionId, TransactionStatus};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A resource enlisted in a [`LocalTransaction`], e.g. a connection.
///
/// Hooks run while the transaction resolves; an error aborts the resolution
/// and surfaces as [`TransactionError::Resource`].
pub trait TransactionResource: Send + Sync + fmt::Debug {
    /// Makes the resource's work durable.
    fn commit(&self) -> Result<(), String>;

    /// Discards the resource's work.
    fn rollback(&self) -> Result<(), String>;
}

/// A local (optionally XA-flagged) transaction backed by enlisted resources.
///
/// Counts every resolution and suspension so callers can verify that exactly
/// one party resolved it.
pub struct LocalTransaction {
    id: TransactionId,
    xa: bool,
    status: Mutex<TransactionStatus>,
    rollback_only: AtomicBool,
    resources: Mutex<Vec<Arc<dyn TransactionResource>>>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    suspends: AtomicUsize,
    resumes: AtomicUsize,
}

impl LocalTransaction {
    /// Creates a non-XA transaction in `NotStarted` status.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: TransactionId::new(),
            xa: false,
            status: Mutex::new(TransactionStatus::NotStarted),
            rollback_only: AtomicBool::new(false),
            resources: Mutex::new(Vec::new()),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            suspends: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        }
    }

    /// Creates an XA transaction.
    #[must_use]
    pub fn xa() -> Self {
        Self {
            xa: true,
            ..Self::new()
        }
    }

    /// Enlists a resource.
    pub fn enlist(&self, resource: Arc<dyn TransactionResource>) {
        self.resources.lock().push(resource);
    }

    /// Number of successful commits.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of successful rollbacks.
    #[must_use]
    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Number of suspensions.
    #[must_use]
    pub fn suspend_count(&self) -> usize {
        self.suspends.load(Ordering::SeqCst)
    }

    /// Number of resumptions.
    #[must_use]
    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    fn resolve(
        &self,
        operation: &'static str,
        target: TransactionStatus,
    ) -> Result<(), TransactionError> {
        let mut status = self.status.lock();
        if *status != TransactionStatus::Active {
            return Err(TransactionError::illegal_state(self.id, operation, *status));
        }
        let resources = self.resources.lock().clone();
        for resource in &resources {
            let result = match target {
                TransactionStatus::Committed => resource.commit(),
                _ => resource.rollback(),
            };
            result.map_err(|message| TransactionError::Resource {
                id: self.id,
                operation,
                message,
            })?;
        }
        *status = target;
        debug!(tx = %self.id, operation, resources = resources.len(), "Transaction resolved");
        Ok(())
    }
}

impl Default for LocalTransaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransaction")
            .field("id", &self.id)
            .field("xa", &self.xa)
            .field("status", &*self.status.lock())
            .field("rollback_only", &self.rollback_only.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Transaction for LocalTransaction {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn begin(&self) -> Result<(), TransactionError> {
        let mut status = self.status.lock();
        if *status != TransactionStatus::NotStarted {
            return Err(TransactionError::illegal_state(self.id, "begin", *status));
        }
        *status = TransactionStatus::Active;
        Ok(())
    }

    fn commit(&self) -> Result<(), TransactionError> {
        if self.is_rollback_only() {
            let status = *self.status.lock();
            return Err(TransactionError::illegal_state(
                self.id,
                "commit a rollback-only transaction",
                status,
            ));
        }
        self.resolve("commit", TransactionStatus::Committed)?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        self.resolve("rollback", TransactionStatus::RolledBack)?;
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn suspend(&self) -> Result<(), TransactionError> {
        let mut status = self.status.lock();
        if *status != TransactionStatus::Active {
            return Err(TransactionError::illegal_state(self.id, "suspend", *status));
        }
        *status = TransactionStatus::Suspended;
        self.suspends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), TransactionError> {
        let mut status = self.status.lock();
        if *status != TransactionStatus::Suspended {
            return Err(TransactionError::illegal_state(self.id, "resume", *status));
        }
        *status = TransactionStatus::Active;
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_rollback_only(&self) -> Result<(), TransactionError> {
        let status = *self.status.lock();
        if status.is_resolved() {
            return Err(TransactionError::illegal_state(
                self.id,
                "mark rollback-only",
                status,
            ));
        }
        self.rollback_only.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    fn is_xa(&self) -> bool {
        self.xa
    }

    fn status(&self) -> TransactionStatus {
        *self.status.lock()
    }
}

/// Factory producing [`LocalTransaction`]s.
///
/// The factory holds no reference to what it creates; a transaction lives as
/// long as the template frame that owns it.
#[derive(Debug, Default)]
pub struct LocalTransactionFactory {
    xa: bool,
    resources: Vec<Arc<dyn TransactionResource>>,
}

impl LocalTransactionFactory {
    /// Creates a factory for non-XA transactions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory for XA transactions.
    #[must_use]
    pub fn xa() -> Self {
        Self {
            xa: true,
            ..Self::default()
        }
    }

    /// Enlists `resource` in every transaction the factory creates.
    #[must_use]
    pub fn with_resource(mut self, resource: Arc<dyn TransactionResource>) -> Self {
        self.resources.push(resource);
        self
    }
}

impl TransactionFactory for LocalTransactionFactory {
    fn begin_transaction(&self) -> Result<Arc<dyn Transaction>, TransactionError> {
        let tx = Arc::new(if self.xa {
            LocalTransaction::xa()
        } else {
            LocalTransaction::new()
        });
        for resource in &self.resources {
            tx.enlist(resource.clone());
        }
        tx.begin()?;
        Ok(tx)
    }
}
