//! Stream variants: a ring buffer drained by subscriber loops.

use super::chain::Chain;
use super::completion::{completion, Completer, Completion};
use super::config::{BackPressureStrategy, StrategyKind};
use super::ring_buffer::{PushError, RingBuffer};
use super::runtime::StrategyRuntime;
use crate::core::Event;
use crate::errors::FlowError;
use crate::pipeline::Pipeline;
use crate::scheduler::growing_pool;
use std::sync::Arc;
use tracing::{debug, warn};

struct StreamJob {
    pipeline: Pipeline,
    event: Event,
    completer: Completer,
}

/// Ingestion side of a stream strategy.
pub(crate) struct StreamEngine {
    ring: Arc<RingBuffer<StreamJob>>,
}

impl StreamEngine {
    /// Creates the ring buffer and starts the subscriber loops on the
    /// strategy's `ring-buffer` pool.
    pub(crate) fn start(runtime: &Arc<StrategyRuntime>) -> Result<Self, FlowError> {
        let config = runtime.config();
        let kind = config.kind;
        let ring = Arc::new(RingBuffer::new(config.buffer_size));
        let subscribers =
            runtime.custom_pool("ring-buffer", growing_pool(config.subscriber_count))?;

        for id in 0..config.subscriber_count {
            let ring = ring.clone();
            let runtime = runtime.clone();
            subscribers.submit(move || subscribe(id, &runtime, &ring, kind))?;
        }
        debug!(
            strategy = runtime.name(),
            subscribers = config.subscriber_count,
            buffer_size = config.buffer_size,
            "Stream subscribers started"
        );
        Ok(Self { ring })
    }

    /// Queues a run. A full buffer blocks or fails per the back-pressure strategy.
    pub(crate) fn enqueue(
        &self,
        runtime: &StrategyRuntime,
        pipeline: Pipeline,
        event: Event,
    ) -> Completion {
        let (completer, completion) = completion(&event, None);
        let wait = runtime.config().back_pressure == BackPressureStrategy::Wait;
        let job = StreamJob {
            pipeline,
            event,
            completer,
        };
        match self.ring.push(job, wait) {
            Ok(()) => {}
            Err(PushError::Full(job)) => {
                warn!(strategy = runtime.name(), "Ring buffer full, failing run");
                job.completer.fail(
                    job.event,
                    FlowError::Overload {
                        scheduler: runtime.name().to_string(),
                        attempts: 1,
                    },
                );
            }
            Err(PushError::Closed(job)) => {
                job.completer.fail(job.event, runtime.disposed_error());
            }
        }
        completion
    }

    /// Returns the number of queued runs.
    pub(crate) fn queued(&self) -> usize {
        self.ring.len()
    }

    /// Closes the buffer and fails every queued run with `Disposed`.
    pub(crate) fn close(&self, runtime: &StrategyRuntime) {
        let remaining = self.ring.close();
        if !remaining.is_empty() {
            debug!(
                strategy = runtime.name(),
                dropped = remaining.len(),
                "Discarding queued runs"
            );
        }
        for job in remaining {
            job.completer.fail(job.event, runtime.disposed_error());
        }
    }
}

/// One subscriber: take a permit, take a job, hand it to its chain.
fn subscribe(
    id: usize,
    runtime: &Arc<StrategyRuntime>,
    ring: &RingBuffer<StreamJob>,
    kind: StrategyKind,
) {
    loop {
        let Ok(permit) = runtime.limiter().acquire(BackPressureStrategy::Wait) else {
            break;
        };
        let Some(mut job) = ring.pop() else {
            break;
        };
        job.completer.attach_permit(permit);
        if runtime.is_disposed() {
            job.completer.fail(job.event, runtime.disposed_error());
            break;
        }

        let pools = match runtime.pools() {
            Ok(pools) => pools,
            Err(err) => {
                job.completer.fail(job.event, err);
                break;
            }
        };
        let (home, offload) = match kind {
            StrategyKind::StreamWorkQueue => (pools.io().clone(), false),
            StrategyKind::StreamProactor => (pools.light().clone(), true),
            _ => (pools.light().clone(), false),
        };
        Chain::new(runtime.clone(), home, job.pipeline, offload, job.completer).start(job.event);
    }
    debug!(strategy = runtime.name(), subscriber = id, "Stream subscriber stopped");
}
