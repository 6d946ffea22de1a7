//! Continuation chains: a pipeline run that hops between pools.
//!
//! A chain has a home pool. Steps that do not need offloading run inline on
//! the home thread; with offloading enabled, blocking and intensive steps are
//! submitted to their category pool and the continuation is resubmitted to
//! home once they finish. No thread waits across a hop.

use super::completion::Completer;
use super::runtime::{execute_step, StrategyRuntime};
use crate::core::Event;
use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;
use std::sync::Arc;
use tracing::trace;

pub(crate) struct Chain {
    runtime: Arc<StrategyRuntime>,
    home: Arc<Scheduler>,
    pipeline: Pipeline,
    offload: bool,
    completer: Completer,
}

impl Chain {
    pub(crate) fn new(
        runtime: Arc<StrategyRuntime>,
        home: Arc<Scheduler>,
        pipeline: Pipeline,
        offload: bool,
        completer: Completer,
    ) -> Self {
        Self {
            runtime,
            home,
            pipeline,
            offload,
            completer,
        }
    }

    /// Schedules the first step on the home pool.
    pub(crate) fn start(self, event: Event) {
        self.resume_at_home(0, event);
    }

    fn resume_at_home(self, index: usize, event: Event) {
        let home = self.home.clone();
        let runtime = self.runtime.clone();
        match runtime.reserve(&home) {
            Ok(reservation) => {
                reservation.spawn(move || self.drive(index, event));
            }
            Err(err) => self.completer.fail(event, err),
        };
    }

    /// Runs steps from `index` on the current (home) thread until the
    /// pipeline ends, fails, or a step must be offloaded.
    fn drive(self, mut index: usize, mut event: Event) {
        while let Some(step) = self.pipeline.step(index).cloned() {
            if step.is_fire_and_forget() {
                self.runtime.detach(step, &event);
                index += 1;
                continue;
            }
            if self.offload && step.processing_type().needs_offload() {
                self.offload_step(index, event);
                return;
            }
            match execute_step(step.as_ref(), event) {
                Ok(next) => {
                    event = next;
                    index += 1;
                }
                Err(exception) => {
                    self.completer.complete(Err(exception));
                    return;
                }
            }
        }
        self.completer.complete(Ok(event));
    }

    fn offload_step(self, index: usize, event: Event) {
        let target = match self.runtime.pools() {
            Ok(pools) => {
                let Some(step) = self.pipeline.step(index) else {
                    self.completer.complete(Ok(event));
                    return;
                };
                pools.for_type(step.processing_type()).clone()
            }
            Err(err) => {
                self.completer.fail(event, err);
                return;
            }
        };
        trace!(pool = target.name(), index, "Offloading step");
        let runtime = self.runtime.clone();
        match runtime.reserve(&target) {
            Ok(reservation) => {
                reservation.spawn(move || self.run_offloaded(index, event));
            }
            Err(err) => self.completer.fail(event, err),
        };
    }

    fn run_offloaded(self, index: usize, event: Event) {
        let Some(step) = self.pipeline.step(index).cloned() else {
            self.completer.complete(Ok(event));
            return;
        };
        match execute_step(step.as_ref(), event) {
            Ok(next) => self.resume_at_home(index + 1, next),
            Err(exception) => self.completer.complete(Err(exception)),
        }
    }
}
