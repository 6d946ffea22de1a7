//! Processing strategies: where and how a pipeline's steps run.
//!
//! Every run starts with a transaction check on the calling thread. With a
//! transaction bound, a strategy either fails before any step runs or runs
//! the whole pipeline inline, depending on its [`TransactionPolicy`].
//! Otherwise the run is dispatched according to the strategy's kind:
//!
//! - `Direct`: all steps on the calling thread
//! - `WorkQueue`: the whole pipeline as one I/O task
//! - `EventLoop` / `Proactor`: a continuation chain offloading blocking and
//!   intensive steps
//! - `Stream*`: a bounded ring buffer drained by subscriber loops

mod chain;
mod completion;
mod config;
mod direct;
mod limiter;
mod ring_buffer;
mod runtime;
mod stream;

pub use completion::Completion;
pub use config::{BackPressureStrategy, StrategyConfig, StrategyKind, TransactionPolicy};
pub use limiter::{ConcurrencyLimiter, Permit};

use crate::core::Event;
use crate::errors::FlowError;
use crate::execution::ProcessingException;
use crate::pipeline::Pipeline;
use crate::scheduler::{growing_pool, Scheduler, SchedulerPools};
use crate::transaction::TransactionRegistry;
use chain::Chain;
use runtime::{run_inline, StrategyRuntime};
use std::sync::Arc;
use std::time::Duration;
use stream::StreamEngine;
use tracing::{debug, info, warn};

/// Failure message of a transactional run on a strategy that cannot run it.
pub const ASYNC_TRANSACTION_MESSAGE: &str =
    "Unable to process a transactional pipeline asynchronously";

enum Engine {
    Direct,
    Chain {
        home: Arc<Scheduler>,
        offload: bool,
    },
    Stream(StreamEngine),
}

/// Runs pipelines according to a [`StrategyConfig`].
pub struct ProcessingStrategy {
    runtime: Arc<StrategyRuntime>,
    engine: Engine,
}

impl ProcessingStrategy {
    /// Creates a strategy on `pools`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid config, or an error if a
    /// custom pool cannot be started.
    pub fn new(config: StrategyConfig, pools: Arc<SchedulerPools>) -> Result<Self, FlowError> {
        config.validate()?;
        let kind = config.kind;
        let event_loop_threads = config.event_loop_threads;
        let runtime = Arc::new(StrategyRuntime::new(config, pools.clone()));

        let engine = match kind {
            StrategyKind::Direct => Engine::Direct,
            StrategyKind::WorkQueue => Engine::Chain {
                home: pools.io().clone(),
                offload: false,
            },
            StrategyKind::Proactor => Engine::Chain {
                home: pools.light().clone(),
                offload: true,
            },
            StrategyKind::EventLoop => Engine::Chain {
                home: runtime.custom_pool("event-loop", growing_pool(event_loop_threads))?,
                offload: true,
            },
            StrategyKind::StreamReactor
            | StrategyKind::StreamProactor
            | StrategyKind::StreamWorkQueue => Engine::Stream(StreamEngine::start(&runtime)?),
        };

        debug!(strategy = runtime.name(), %kind, "Processing strategy created");
        Ok(Self { runtime, engine })
    }

    /// Creates a strategy on the process-wide pools.
    pub fn with_global_pools(config: StrategyConfig) -> Result<Self, FlowError> {
        Self::new(config, SchedulerPools::global()?)
    }

    /// Returns the strategy name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.runtime.name()
    }

    /// Returns the strategy kind.
    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        self.runtime.config().kind
    }

    /// Returns the strategy config.
    #[must_use]
    pub fn config(&self) -> &StrategyConfig {
        self.runtime.config()
    }

    /// Returns the number of runs holding a concurrency permit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.runtime.limiter().in_flight()
    }

    /// Returns the number of runs waiting in the ring buffer.
    #[must_use]
    pub fn queued(&self) -> usize {
        match &self.engine {
            Engine::Stream(stream) => stream.queued(),
            _ => 0,
        }
    }

    /// Returns true after [`dispose`](Self::dispose).
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.runtime.is_disposed()
    }

    /// Starts a run of `pipeline` with `event`.
    ///
    /// Failures to start (disposed strategy, forbidden transaction, overload)
    /// are reported through the returned completion.
    pub fn run(&self, pipeline: &Pipeline, event: Event) -> Completion {
        if self.runtime.is_disposed() {
            return Completion::failed(event, self.runtime.disposed_error());
        }

        if let Some(tx) = TransactionRegistry::current() {
            return match self.runtime.transaction_policy() {
                TransactionPolicy::FailFast => {
                    warn!(
                        strategy = self.name(),
                        tx = %tx.id(),
                        "Transactional run on a non-transactional strategy"
                    );
                    Completion::failed(
                        event,
                        FlowError::TransactionUsage(ASYNC_TRANSACTION_MESSAGE.to_string()),
                    )
                }
                TransactionPolicy::Synchronous => {
                    debug!(strategy = self.name(), tx = %tx.id(), "Running pipeline synchronously");
                    Completion::ready(run_inline(pipeline, event))
                }
            };
        }

        match &self.engine {
            Engine::Stream(stream) => stream.enqueue(&self.runtime, pipeline.clone(), event),
            Engine::Direct => {
                let permit = match self.runtime.limiter().acquire(self.config().back_pressure) {
                    Ok(permit) => permit,
                    Err(err) => return Completion::failed(event, err),
                };
                let result = direct::run(&self.runtime, pipeline, event);
                drop(permit);
                Completion::ready(result)
            }
            Engine::Chain { home, offload } => {
                let permit = match self.runtime.limiter().acquire(self.config().back_pressure) {
                    Ok(permit) => permit,
                    Err(err) => return Completion::failed(event, err),
                };
                let (completer, completion) = completion::completion(&event, Some(permit));
                Chain::new(
                    self.runtime.clone(),
                    home.clone(),
                    pipeline.clone(),
                    *offload,
                    completer,
                )
                .start(event);
                completion
            }
        }
    }

    /// Runs `pipeline` and blocks until it finishes.
    pub fn process(&self, pipeline: &Pipeline, event: Event) -> Result<Event, ProcessingException> {
        self.run(pipeline, event).wait()
    }

    /// Stops accepting runs, fails queued stream runs, waits up to `timeout`
    /// for in-flight runs and releases the strategy's pools.
    ///
    /// Returns true if every in-flight run finished in time. Disposing twice
    /// is a no-op.
    pub fn dispose(&self, timeout: Duration) -> bool {
        if !self.runtime.mark_disposed() {
            return true;
        }
        if let Engine::Stream(stream) = &self.engine {
            stream.close(&self.runtime);
        }
        let limiter = self.runtime.limiter();
        limiter.close();
        let drained = limiter.wait_idle(timeout);
        self.runtime.release_pools(timeout);
        if drained {
            info!(strategy = self.name(), "Processing strategy disposed");
        } else {
            warn!(
                strategy = self.name(),
                in_flight = limiter.in_flight(),
                "Processing strategy disposed with runs in flight"
            );
        }
        drained
    }
}

impl std::fmt::Debug for ProcessingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingStrategy")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("in_flight", &self.in_flight())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl Drop for ProcessingStrategy {
    fn drop(&mut self) {
        if !self.is_disposed() {
            self.dispose(Duration::ZERO);
        }
    }
}
