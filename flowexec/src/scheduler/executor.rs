//! A named, bounded pool of worker threads.

use super::in_flight::InFlight;
use super::metrics::SchedulerMetrics;
use crate::errors::{panic_message, FlowError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info, warn};

/// What a scheduler does when it is saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectionPolicy {
    /// Refuse the submission.
    #[default]
    Reject,
    /// Queue without bound.
    Grow,
}

/// Sizing of one scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Tasks that may wait for a free thread.
    pub queue_capacity: usize,
    /// Behavior when saturated.
    pub rejection_policy: RejectionPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            queue_capacity: 0,
            rejection_policy: RejectionPolicy::Reject,
        }
    }
}

impl PoolConfig {
    /// Creates a config with `threads` workers and no queue.
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the rejection policy.
    #[must_use]
    pub fn with_rejection_policy(mut self, policy: RejectionPolicy) -> Self {
        self.rejection_policy = policy;
        self
    }

    /// Returns the maximum number of accepted, unfinished tasks.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        match self.rejection_policy {
            RejectionPolicy::Reject => Some(self.threads + self.queue_capacity),
            RejectionPolicy::Grow => None,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.threads == 0 {
            return Err(FlowError::configuration("pool threads must be at least 1"));
        }
        Ok(())
    }
}

/// Why a scheduler refused a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The scheduler is saturated.
    #[error("Scheduler '{scheduler}' rejected the task")]
    Rejected {
        /// The scheduler name.
        scheduler: String,
    },
    /// The scheduler has been stopped.
    #[error("Scheduler '{scheduler}' is stopped")]
    Stopped {
        /// The scheduler name.
        scheduler: String,
    },
}

impl From<SchedulerError> for FlowError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Rejected { scheduler } => Self::Rejected { scheduler },
            SchedulerError::Stopped { scheduler } => {
                Self::Disposed(format!("scheduler '{scheduler}' is stopped"))
            }
        }
    }
}

/// Handle to a submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    inner: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    /// Returns true once the task has finished or was discarded.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Blocks until the task finishes. Returns false if it was discarded.
    pub fn join(self) -> bool {
        futures::executor::block_on(self.inner).is_ok()
    }
}

/// Releases one unit of capacity when dropped.
struct InFlightGuard {
    in_flight: Arc<InFlight>,
    metrics: Arc<SchedulerMetrics>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.record_completion();
        self.in_flight.exit();
    }
}

/// Capacity held for a task that has not been spawned yet.
///
/// Dropping an unused reservation gives the capacity back.
#[must_use = "an unused reservation only holds capacity"]
pub struct Reservation<'a> {
    scheduler: &'a Scheduler,
    spawned: bool,
}

impl Reservation<'_> {
    /// Runs `task` on the scheduler using the reserved capacity.
    pub fn spawn<F>(mut self, task: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawned = true;
        let guard = InFlightGuard {
            in_flight: self.scheduler.in_flight.clone(),
            metrics: self.scheduler.metrics.clone(),
        };
        let name = self.scheduler.name.clone();
        let metrics = self.scheduler.metrics.clone();
        self.scheduler.metrics.record_submit();
        let inner = self.scheduler.handle.spawn(async move {
            let _guard = guard;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                metrics.record_panic();
                warn!(
                    scheduler = %name,
                    panic = %panic_message(payload.as_ref()),
                    "Task panicked"
                );
            }
        });
        TaskHandle { inner }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.spawned {
            self.scheduler.in_flight.exit();
        }
    }
}

/// A named pool of worker threads with bounded admission.
///
/// Workers are named `<name>.<NN>`. Each scheduler owns a dedicated
/// multi-thread runtime; tasks are plain closures and may block.
pub struct Scheduler {
    name: String,
    config: PoolConfig,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    in_flight: Arc<InFlight>,
    stopped: AtomicBool,
    metrics: Arc<SchedulerMetrics>,
}

impl Scheduler {
    /// Starts a scheduler.
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Result<Self, FlowError> {
        let name = name.into();
        config.validate()?;

        let counter = Arc::new(AtomicUsize::new(0));
        let thread_prefix = name.clone();
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.threads)
            .thread_name_fn(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                format!("{thread_prefix}.{n:02}")
            })
            .build()
            .map_err(|e| FlowError::Internal(format!("failed to start scheduler '{name}': {e}")))?;

        debug!(
            scheduler = %name,
            threads = config.threads,
            queue_capacity = config.queue_capacity,
            policy = ?config.rejection_policy,
            "Scheduler started"
        );

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            name,
            config,
            in_flight: Arc::new(InFlight::default()),
            stopped: AtomicBool::new(false),
            metrics: Arc::new(SchedulerMetrics::default()),
        })
    }

    /// Returns the scheduler name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the scheduler's sizing.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns the scheduler's counters.
    #[must_use]
    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    /// Returns the number of accepted, unfinished tasks.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Returns true after [`stop`](Self::stop).
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Returns true if the calling thread is one of this scheduler's workers.
    #[must_use]
    pub fn is_current_thread(&self) -> bool {
        std::thread::current()
            .name()
            .and_then(|n| n.strip_prefix(self.name.as_str()))
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|n| n.chars().all(|c| c.is_ascii_digit()))
    }

    /// Reserves capacity for one task without consuming it.
    pub fn try_reserve(&self) -> Result<Reservation<'_>, SchedulerError> {
        if self.is_stopped() {
            return Err(SchedulerError::Stopped {
                scheduler: self.name.clone(),
            });
        }
        match self.config.capacity() {
            None => self.in_flight.enter(),
            Some(capacity) => {
                if !self.in_flight.try_enter(capacity) {
                    self.metrics.record_rejection();
                    return Err(SchedulerError::Rejected {
                        scheduler: self.name.clone(),
                    });
                }
            }
        }
        Ok(Reservation {
            scheduler: self,
            spawned: false,
        })
    }

    /// Submits a task, failing when the scheduler is saturated or stopped.
    pub fn submit<F>(&self, task: F) -> Result<TaskHandle, SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        Ok(self.try_reserve()?.spawn(task))
    }

    /// Stops accepting work, waits up to `timeout` for in-flight tasks and
    /// then shuts the workers down. Returns true if every task finished.
    ///
    /// Tasks still queued after the timeout are discarded.
    pub fn stop(&self, timeout: Duration) -> bool {
        self.stopped.store(true, Ordering::SeqCst);
        let drained = self.in_flight.wait_drained(timeout);
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
        if drained {
            info!(scheduler = %self.name, "Scheduler stopped");
        } else {
            warn!(
                scheduler = %self.name,
                in_flight = self.in_flight(),
                "Scheduler stopped with unfinished tasks"
            );
        }
        drained
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}
