//! Thread-affined registry of the active transaction.
//!
//! Each worker thread owns one slot holding at most one transaction. Only the
//! owning thread ever reads or writes its slot, so no locking is needed and
//! every operation is atomic with respect to that thread's view.

use super::model::{same_transaction, Transaction, TransactionError};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::{debug, trace};

thread_local! {
    static BOUND: RefCell<Option<Arc<dyn Transaction>>> = const { RefCell::new(None) };
}

/// Per-thread transaction binding.
///
/// There is no cross-thread visibility: a transaction bound on one thread is
/// invisible to every other thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionRegistry;

impl TransactionRegistry {
    /// Binds `tx` to the calling thread.
    ///
    /// Binding the transaction that is already bound is a no-op. Binding over a
    /// different transaction is a usage error.
    pub fn bind(tx: Arc<dyn Transaction>) -> Result<(), TransactionError> {
        BOUND.with(|slot| {
            let mut slot = slot.borrow_mut();
            if let Some(current) = slot.as_ref() {
                if same_transaction(current.as_ref(), tx.as_ref()) {
                    return Ok(());
                }
                return Err(TransactionError::usage(format!(
                    "cannot bind transaction {} to thread {:?}: transaction {} is already bound",
                    tx.id(),
                    std::thread::current().name().unwrap_or("unnamed"),
                    current.id()
                )));
            }
            trace!(tx = %tx.id(), "Binding transaction");
            *slot = Some(tx);
            Ok(())
        })
    }

    /// Unbinds `tx` from the calling thread.
    pub fn unbind(tx: &dyn Transaction) -> Result<(), TransactionError> {
        BOUND.with(|slot| {
            let mut slot = slot.borrow_mut();
            match slot.as_ref() {
                Some(current) if same_transaction(current.as_ref(), tx) => {
                    trace!(tx = %tx.id(), "Unbinding transaction");
                    *slot = None;
                    Ok(())
                }
                Some(current) => Err(TransactionError::usage(format!(
                    "cannot unbind transaction {}: transaction {} is bound instead",
                    tx.id(),
                    current.id()
                ))),
                None => Err(TransactionError::usage(format!(
                    "cannot unbind transaction {}: no transaction is bound",
                    tx.id()
                ))),
            }
        })
    }

    /// Returns the transaction bound to the calling thread.
    #[must_use]
    pub fn current() -> Option<Arc<dyn Transaction>> {
        BOUND.with(|slot| slot.borrow().clone())
    }

    /// Returns true if a transaction is bound to the calling thread.
    #[must_use]
    pub fn is_active() -> bool {
        BOUND.with(|slot| slot.borrow().is_some())
    }

    /// Unbinds and suspends the current transaction without resolving it.
    ///
    /// Returns `Ok(None)` when nothing is bound. If the transaction refuses to
    /// suspend it stays bound.
    pub fn suspend() -> Result<Option<Arc<dyn Transaction>>, TransactionError> {
        let Some(tx) = BOUND.with(|slot| slot.borrow_mut().take()) else {
            return Ok(None);
        };
        if let Err(err) = tx.suspend() {
            BOUND.with(|slot| *slot.borrow_mut() = Some(tx));
            return Err(err);
        }
        debug!(tx = %tx.id(), xa = tx.is_xa(), "Suspended transaction");
        Ok(Some(tx))
    }

    /// Resumes a previously suspended transaction and rebinds it to the calling thread.
    pub fn resume(tx: Arc<dyn Transaction>) -> Result<(), TransactionError> {
        if let Some(current) = Self::current() {
            if !same_transaction(current.as_ref(), tx.as_ref()) {
                return Err(TransactionError::usage(format!(
                    "cannot resume transaction {}: transaction {} is bound",
                    tx.id(),
                    current.id()
                )));
            }
        }
        tx.resume()?;
        debug!(tx = %tx.id(), "Resumed transaction");
        BOUND.with(|slot| *slot.borrow_mut() = Some(tx));
        Ok(())
    }

    /// Clears the calling thread's slot, returning what was bound.
    ///
    /// Intended for test setup and worker recycling.
    pub fn clear() -> Option<Arc<dyn Transaction>> {
        BOUND.with(|slot| slot.borrow_mut().take())
    }
}
