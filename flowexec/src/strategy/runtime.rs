//! State shared by a strategy and the tasks it dispatches.

use super::config::{StrategyConfig, TransactionPolicy};
use super::limiter::ConcurrencyLimiter;
use crate::core::Event;
use crate::errors::{panic_message, FlowError};
use crate::execution::ProcessingException;
use crate::pipeline::{Pipeline, PipelineStep};
use crate::scheduler::{
    growing_pool, reserve_with_retry, PoolConfig, Reservation, Scheduler, SchedulerPools,
};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub(crate) struct StrategyRuntime {
    config: StrategyConfig,
    pools: RwLock<Option<Arc<SchedulerPools>>>,
    limiter: Arc<ConcurrencyLimiter>,
    disposed: AtomicBool,
    owned_pools: Mutex<Vec<String>>,
}

impl StrategyRuntime {
    pub(crate) fn new(config: StrategyConfig, pools: Arc<SchedulerPools>) -> Self {
        Self {
            limiter: ConcurrencyLimiter::new(config.name.clone(), config.max_concurrency),
            config,
            pools: RwLock::new(Some(pools)),
            disposed: AtomicBool::new(false),
            owned_pools: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    pub(crate) fn transaction_policy(&self) -> TransactionPolicy {
        self.config.effective_transaction_policy()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn disposed_error(&self) -> FlowError {
        FlowError::Disposed(format!("strategy '{}' has been disposed", self.name()))
    }

    pub(crate) fn pools(&self) -> Result<Arc<SchedulerPools>, FlowError> {
        self.pools.read().clone().ok_or_else(|| self.disposed_error())
    }

    /// Returns the custom pool `<name>.<suffix>`, creating it on first use.
    ///
    /// Strategies sharing a name share the pool. Each strategy counts as one
    /// user of it until [`release_pools`](Self::release_pools).
    pub(crate) fn custom_pool(
        &self,
        suffix: &str,
        config: PoolConfig,
    ) -> Result<Arc<Scheduler>, FlowError> {
        let pool_name = format!("{}.{suffix}", self.name());
        let mut owned = self.owned_pools.lock();
        let pools = self.pools()?;
        if owned.contains(&pool_name) {
            if let Some(scheduler) = pools.get_custom(&pool_name) {
                return Ok(scheduler);
            }
        }
        let scheduler = pools.custom(&pool_name, config)?;
        if !owned.contains(&pool_name) {
            owned.push(pool_name);
        }
        Ok(scheduler)
    }

    /// Reserves capacity on `scheduler`, retrying while it is saturated.
    pub(crate) fn reserve<'a>(
        &self,
        scheduler: &'a Scheduler,
    ) -> Result<Reservation<'a>, FlowError> {
        reserve_with_retry(scheduler, &self.config.rejection_retry)
    }

    /// Runs a fire-and-forget step on a copy of `event` without waiting for it.
    pub(crate) fn detach(&self, step: Arc<dyn PipelineStep>, event: &Event) {
        let pool = growing_pool(self.config.fire_and_forget_threads);
        let scheduler = match self.custom_pool("async", pool) {
            Ok(scheduler) => scheduler,
            Err(err) => {
                warn!(step = step.name(), error = %err, "Fire-and-forget step dropped");
                return;
            }
        };
        match self.reserve(&scheduler) {
            Ok(reservation) => {
                let copy = event.clone();
                reservation.spawn(move || {
                    if let Err(exception) = execute_step(step.as_ref(), copy) {
                        warn!(error = %exception, "Fire-and-forget step failed");
                    }
                });
            }
            Err(err) => {
                warn!(
                    step = step.name(),
                    error = %err,
                    "Fire-and-forget step could not be scheduled"
                );
            }
        };
    }

    /// Marks the strategy disposed. Returns false if it already was.
    pub(crate) fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::SeqCst)
    }

    /// Releases the custom pools and drops the shared pools. A custom pool
    /// stops once no other strategy uses it.
    pub(crate) fn release_pools(&self, timeout: Duration) {
        let (owned, pools) = {
            let mut owned = self.owned_pools.lock();
            (std::mem::take(&mut *owned), self.pools.write().take())
        };
        if let Some(pools) = pools {
            for name in &owned {
                pools.release_custom(name, timeout);
            }
        }
        debug!(strategy = self.name(), pools = owned.len(), "Released strategy pools");
    }
}

/// Runs one step, turning errors and panics into a [`ProcessingException`]
/// that carries the event the step received.
pub(crate) fn execute_step(
    step: &dyn PipelineStep,
    event: Event,
) -> Result<Event, ProcessingException> {
    debug!(
        step = step.name(),
        processing_type = %step.processing_type(),
        thread = std::thread::current().name().unwrap_or("unnamed"),
        "Running step"
    );
    let in_flight = event.clone();
    match catch_unwind(AssertUnwindSafe(|| step.process(event))) {
        Ok(Ok(next)) => Ok(next),
        Ok(Err(err)) => Err(ProcessingException::new(
            in_flight,
            FlowError::step(step.name(), err),
        )),
        Err(payload) => Err(ProcessingException::new(
            in_flight,
            FlowError::StepPanicked {
                step: step.name().to_string(),
                message: panic_message(payload.as_ref()),
            },
        )),
    }
}

/// Runs every step on the calling thread, fire-and-forget steps included.
///
/// A failing fire-and-forget step is logged and the pipeline continues with
/// the event it received.
pub(crate) fn run_inline(pipeline: &Pipeline, event: Event) -> Result<Event, ProcessingException> {
    let mut event = event;
    for step in pipeline.steps() {
        if step.is_fire_and_forget() {
            if let Err(exception) = execute_step(step.as_ref(), event.clone()) {
                warn!(error = %exception, "Fire-and-forget step failed");
            }
            continue;
        }
        event = execute_step(step.as_ref(), event)?;
    }
    Ok(event)
}
