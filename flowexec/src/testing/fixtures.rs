//! Test fixtures: small pools, events and transaction factories.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::Event;
use crate::errors::FlowError;
use crate::scheduler::{PoolConfig, PoolsConfig, RejectionPolicy, SchedulerPools};
use crate::transaction::{
    LocalTransaction, Transaction, TransactionError, TransactionFactory, TransactionResource,
};

/// Builds a pool set sized for tests: two threads per category with bounded queues.
pub fn small_pools() -> Result<Arc<SchedulerPools>, FlowError> {
    pools_with(PoolsConfig {
        light: PoolConfig::new(2).with_queue_capacity(64),
        io: PoolConfig::new(2).with_queue_capacity(64),
        intensive: PoolConfig::new(2).with_queue_capacity(64),
    })
}

/// Builds a pool set where the blocking and intensive pools accept exactly
/// `capacity` tasks and reject the rest.
pub fn saturating_pools(capacity: usize) -> Result<Arc<SchedulerPools>, FlowError> {
    let tight = PoolConfig::new(capacity)
        .with_queue_capacity(0)
        .with_rejection_policy(RejectionPolicy::Reject);
    pools_with(PoolsConfig {
        light: PoolConfig::new(2).with_queue_capacity(64),
        io: tight.clone(),
        intensive: tight,
    })
}

/// Builds a pool set from an explicit config.
pub fn pools_with(config: PoolsConfig) -> Result<Arc<SchedulerPools>, FlowError> {
    Ok(Arc::new(SchedulerPools::new(&config)?))
}

/// Creates an event with a small object payload.
#[must_use]
pub fn test_event() -> Event {
    Event::correlated(json!({"order": 42, "items": ["a", "b"]}), "test-correlation")
}

/// Creates an active, not yet bound, local transaction.
pub fn active_transaction() -> Result<Arc<LocalTransaction>, TransactionError> {
    let tx = Arc::new(LocalTransaction::new());
    tx.begin()?;
    Ok(tx)
}

/// A transaction factory with scripted behavior.
///
/// Begins fresh [`LocalTransaction`]s unless told to fail, and can expose a
/// fixed external transaction.
#[derive(Debug, Default)]
pub struct FixedTransactionFactory {
    external: Option<Arc<LocalTransaction>>,
    resources: Vec<Arc<dyn TransactionResource>>,
    fail_begin: AtomicBool,
    created: Mutex<Vec<Arc<LocalTransaction>>>,
}

impl FixedTransactionFactory {
    /// Creates a factory that begins local transactions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes `tx` as the transaction started outside the runtime.
    #[must_use]
    pub fn with_external(mut self, tx: Arc<LocalTransaction>) -> Self {
        self.external = Some(tx);
        self
    }

    /// Enlists `resource` in every transaction the factory begins.
    #[must_use]
    pub fn with_resource(mut self, resource: Arc<dyn TransactionResource>) -> Self {
        self.resources.push(resource);
        self
    }

    /// Makes every subsequent `begin_transaction` fail.
    pub fn fail_begin(&self) {
        self.fail_begin.store(true, Ordering::SeqCst);
    }

    /// Returns every transaction begun so far.
    #[must_use]
    pub fn created(&self) -> Vec<Arc<LocalTransaction>> {
        self.created.lock().clone()
    }

    /// Returns the most recently begun transaction.
    #[must_use]
    pub fn last(&self) -> Option<Arc<LocalTransaction>> {
        self.created.lock().last().cloned()
    }
}

impl TransactionFactory for FixedTransactionFactory {
    fn begin_transaction(&self) -> Result<Arc<dyn Transaction>, TransactionError> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(TransactionError::Factory(
                "transaction manager unavailable".to_string(),
            ));
        }
        let tx = active_transaction()?;
        for resource in &self.resources {
            tx.enlist(resource.clone());
        }
        self.created.lock().push(tx.clone());
        Ok(tx)
    }

    fn join_external_transaction(&self) -> Result<Option<Arc<dyn Transaction>>, TransactionError> {
        Ok(self
            .external
            .clone()
            .map(|tx| tx as Arc<dyn Transaction>))
    }
}
