//! Ceiling on in-flight pipeline invocations.

use super::config::BackPressureStrategy;
use crate::errors::FlowError;
use crate::scheduler::InFlight;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Hands out one permit per in-flight invocation, bounded when a maximum is set.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    name: String,
    max: Option<usize>,
    semaphore: Arc<Semaphore>,
    in_flight: InFlight,
}

impl ConcurrencyLimiter {
    /// Creates a limiter; `None` means unbounded.
    #[must_use]
    pub fn new(name: impl Into<String>, max: Option<usize>) -> Arc<Self> {
        let permits = max.map_or(Semaphore::MAX_PERMITS, |max| max.min(Semaphore::MAX_PERMITS));
        Arc::new(Self {
            name: name.into(),
            max,
            semaphore: Arc::new(Semaphore::new(permits)),
            in_flight: InFlight::default(),
        })
    }

    /// Returns the ceiling.
    #[must_use]
    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// Returns the number of outstanding permits.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Acquires a permit, blocking the calling thread under
    /// [`BackPressureStrategy::Wait`].
    ///
    /// # Errors
    ///
    /// With [`BackPressureStrategy::Fail`] a saturated limiter returns
    /// [`FlowError::Overload`]. A closed limiter returns [`FlowError::Disposed`].
    pub fn acquire(self: &Arc<Self>, strategy: BackPressureStrategy) -> Result<Permit, FlowError> {
        let permit = match strategy {
            BackPressureStrategy::Fail => match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => {
                    return Err(FlowError::Overload {
                        scheduler: self.name.clone(),
                        attempts: 1,
                    })
                }
                Err(TryAcquireError::Closed) => return Err(self.closed_error()),
            },
            BackPressureStrategy::Wait => {
                futures::executor::block_on(self.semaphore.clone().acquire_owned())
                    .map_err(|_| self.closed_error())?
            }
        };
        self.in_flight.enter();
        Ok(Permit {
            limiter: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Stops handing out permits and wakes every waiter.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Returns true once [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Waits up to `timeout` for every permit to be released.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.in_flight.wait_drained(timeout)
    }

    fn closed_error(&self) -> FlowError {
        FlowError::Disposed(format!("strategy '{}' no longer accepts work", self.name))
    }
}

/// One in-flight invocation. Released on drop.
#[derive(Debug)]
pub struct Permit {
    limiter: Arc<ConcurrencyLimiter>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.limiter.in_flight.exit();
    }
}
