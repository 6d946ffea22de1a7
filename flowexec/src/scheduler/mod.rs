//! Worker pools and bounded submission.
//!
//! Three shared categories (light, I/O, intensive) plus named custom pools.
//! A saturated pool refuses work instead of dropping it; dispatchers retry
//! the same pool with backoff and eventually report overload.

mod executor;
mod in_flight;
mod metrics;
mod pools;
mod retry;

pub use executor::{
    PoolConfig, RejectionPolicy, Reservation, Scheduler, SchedulerError, TaskHandle,
};
pub(crate) use in_flight::InFlight;
pub use metrics::SchedulerMetrics;
pub use pools::{growing_pool, PoolsConfig, SchedulerPools, INTENSIVE_POOL, IO_POOL, LIGHT_POOL};
pub use retry::{
    reserve_with_retry, submit_with_retry, BackoffState, BackoffStrategy, JitterStrategy,
    RejectionRetryConfig,
};
