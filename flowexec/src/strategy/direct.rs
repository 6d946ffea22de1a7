//! The direct strategy: every step on the calling thread.

use super::runtime::{execute_step, StrategyRuntime};
use crate::core::Event;
use crate::execution::ProcessingException;
use crate::pipeline::Pipeline;

/// Runs `pipeline` on the calling thread. Fire-and-forget steps are handed
/// to the strategy's async pool with a copy of the event and the pipeline
/// continues with the event unchanged.
pub(crate) fn run(
    runtime: &StrategyRuntime,
    pipeline: &Pipeline,
    event: Event,
) -> Result<Event, ProcessingException> {
    let mut event = event;
    for step in pipeline.steps() {
        if step.is_fire_and_forget() {
            runtime.detach(step.clone(), &event);
            continue;
        }
        event = execute_step(step.as_ref(), event)?;
    }
    Ok(event)
}
