//! Mock steps and handlers for testing.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::{Event, ProcessingType};
use crate::errors::{ErrorType, StepError};
use crate::execution::{ExceptionHandler, ProcessingException};
use crate::pipeline::PipelineStep;

/// Variable holding the names of the steps an event passed through.
pub const TRAIL_VARIABLE: &str = "trail";

/// One step execution seen by a [`ThreadRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepVisit {
    /// The step name.
    pub step: String,
    /// The executing thread's name.
    pub thread: String,
}

impl StepVisit {
    /// Returns the pool prefix of the thread name (`io` for `io.03`).
    #[must_use]
    pub fn pool(&self) -> &str {
        self.thread
            .rsplit_once('.')
            .map_or(self.thread.as_str(), |(pool, _)| pool)
    }
}

/// Shared log of which thread ran which step.
#[derive(Debug, Clone, Default)]
pub struct ThreadRecorder {
    visits: Arc<Mutex<Vec<StepVisit>>>,
}

impl ThreadRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `step` runs on the current thread.
    pub fn record(&self, step: &str) {
        let thread = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        self.visits.lock().push(StepVisit {
            step: step.to_string(),
            thread,
        });
    }

    /// Returns every visit in order.
    #[must_use]
    pub fn visits(&self) -> Vec<StepVisit> {
        self.visits.lock().clone()
    }

    /// Returns the thread that ran `step` first.
    #[must_use]
    pub fn thread_of(&self, step: &str) -> Option<String> {
        self.visits
            .lock()
            .iter()
            .find(|v| v.step == step)
            .map(|v| v.thread.clone())
    }

    /// Returns the distinct thread names, sorted.
    #[must_use]
    pub fn distinct_threads(&self) -> Vec<String> {
        let mut threads: Vec<_> = self.visits.lock().iter().map(|v| v.thread.clone()).collect();
        threads.sort();
        threads.dedup();
        threads
    }

    /// Returns the distinct pool prefixes, sorted.
    #[must_use]
    pub fn distinct_pools(&self) -> Vec<String> {
        let mut pools: Vec<_> = self
            .visits
            .lock()
            .iter()
            .map(|v| v.pool().to_string())
            .collect();
        pools.sort();
        pools.dedup();
        pools
    }

    /// Clears the log.
    pub fn reset(&self) {
        self.visits.lock().clear();
    }
}

/// A step that records its thread and appends its name to the event's trail.
#[derive(Debug, Clone)]
pub struct RecordingStep {
    name: String,
    processing_type: ProcessingType,
    recorder: ThreadRecorder,
    calls: Arc<AtomicUsize>,
}

impl RecordingStep {
    /// Creates a recording step.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        processing_type: ProcessingType,
        recorder: &ThreadRecorder,
    ) -> Self {
        Self {
            name: name.into(),
            processing_type,
            recorder: recorder.clone(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PipelineStep for RecordingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn processing_type(&self) -> ProcessingType {
        self.processing_type
    }

    fn process(&self, event: Event) -> Result<Event, StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.recorder.record(&self.name);
        let mut trail = event
            .variable(TRAIL_VARIABLE)
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();
        trail.push(serde_json::Value::String(self.name.clone()));
        Ok(event.with_variable(TRAIL_VARIABLE, serde_json::Value::Array(trail)))
    }
}

/// Returns the trail recorded by [`RecordingStep`]s.
#[must_use]
pub fn trail(event: &Event) -> Vec<String> {
    event
        .variable(TRAIL_VARIABLE)
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// A step that always fails with a given error type.
#[derive(Debug, Clone)]
pub struct FailingStep {
    name: String,
    processing_type: ProcessingType,
    error_type: ErrorType,
    message: String,
}

impl FailingStep {
    /// Creates a failing step of the default `step` error type.
    #[must_use]
    pub fn new(name: impl Into<String>, processing_type: ProcessingType) -> Self {
        Self {
            name: name.into(),
            processing_type,
            error_type: ErrorType::step(),
            message: "Intentional failure".to_string(),
        }
    }

    /// Sets the error type raised.
    #[must_use]
    pub fn with_error_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = error_type;
        self
    }

    /// Sets the error message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl PipelineStep for FailingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn processing_type(&self) -> ProcessingType {
        self.processing_type
    }

    fn process(&self, _event: Event) -> Result<Event, StepError> {
        Err(StepError::typed(self.error_type.clone(), self.message.clone()))
    }
}

#[derive(Debug, Default)]
struct LatchState {
    entered: usize,
    running: usize,
    peak: usize,
    released: bool,
}

/// A gate that [`LatchedStep`]s block on until it is released.
#[derive(Debug, Clone, Default)]
pub struct Latch {
    inner: Arc<(Mutex<LatchState>, Condvar)>,
}

impl Latch {
    /// Creates a closed latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the latch, letting every current and future waiter through.
    pub fn release(&self) {
        let (state, cv) = &*self.inner;
        state.lock().released = true;
        cv.notify_all();
    }

    /// Returns the number of executions that reached the latch.
    #[must_use]
    pub fn entered(&self) -> usize {
        self.inner.0.lock().entered
    }

    /// Returns the highest number of executions waiting at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.inner.0.lock().peak
    }

    /// Waits until at least `count` executions reached the latch.
    pub fn wait_entered(&self, count: usize, timeout: Duration) -> bool {
        let (state, cv) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut guard = state.lock();
        while guard.entered < count {
            if cv.wait_until(&mut guard, deadline).timed_out() {
                return guard.entered >= count;
            }
        }
        true
    }

    fn pass(&self) {
        let (state, cv) = &*self.inner;
        let mut guard = state.lock();
        guard.entered += 1;
        guard.running += 1;
        guard.peak = guard.peak.max(guard.running);
        cv.notify_all();
        while !guard.released {
            cv.wait(&mut guard);
        }
        guard.running -= 1;
    }
}

/// A step that blocks until its [`Latch`] is released.
#[derive(Debug, Clone)]
pub struct LatchedStep {
    name: String,
    processing_type: ProcessingType,
    latch: Latch,
}

impl LatchedStep {
    /// Creates a latched step.
    #[must_use]
    pub fn new(name: impl Into<String>, processing_type: ProcessingType, latch: &Latch) -> Self {
        Self {
            name: name.into(),
            processing_type,
            latch: latch.clone(),
        }
    }
}

impl PipelineStep for LatchedStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn processing_type(&self) -> ProcessingType {
        self.processing_type
    }

    fn process(&self, event: Event) -> Result<Event, StepError> {
        self.latch.pass();
        Ok(event)
    }
}

/// One call seen by a [`RecordingExceptionHandler`].
#[derive(Debug, Clone)]
pub struct HandledCall {
    /// The classified error type name.
    pub error_type: String,
    /// The step that failed, if known.
    pub failing_step: Option<String>,
    /// The in-flight event passed to the handler.
    pub event: Event,
}

/// An exception handler that records every call.
#[derive(Debug, Default)]
pub struct RecordingExceptionHandler {
    handle: bool,
    calls: Mutex<Vec<HandledCall>>,
}

impl RecordingExceptionHandler {
    /// A handler that lets failures propagate.
    #[must_use]
    pub fn propagating() -> Self {
        Self::default()
    }

    /// A handler that marks failures handled.
    #[must_use]
    pub fn handling() -> Self {
        Self {
            handle: true,
            ..Self::default()
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns every call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<HandledCall> {
        self.calls.lock().clone()
    }

    /// Returns the error type names seen, in order.
    #[must_use]
    pub fn error_types(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.error_type.clone()).collect()
    }
}

impl ExceptionHandler for RecordingExceptionHandler {
    fn handle_exception(&self, exception: &mut ProcessingException, event: &Event) -> Event {
        self.calls.lock().push(HandledCall {
            error_type: exception.error_type().name().to_string(),
            failing_step: exception.failing_step().map(str::to_string),
            event: event.clone(),
        });
        if self.handle {
            exception.mark_handled();
        }
        event
            .clone()
            .with_variable("handled_by", serde_json::json!("recording"))
            .with_error(exception.to_event_error())
    }
}
