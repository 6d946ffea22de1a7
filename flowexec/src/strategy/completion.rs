//! The result handle of one pipeline run.

use super::limiter::Permit;
use crate::core::Event;
use crate::errors::FlowError;
use crate::execution::ProcessingException;
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

type RunResult = Result<Event, ProcessingException>;

/// Pending result of a pipeline run.
///
/// Either block with [`wait`](Self::wait) or `.await` it. If the run is
/// discarded (for example by a stopped pool) it resolves to a
/// [`FlowError::Disposed`] failure instead of hanging.
#[derive(Debug)]
#[must_use = "a completion does nothing unless waited on or awaited"]
pub struct Completion {
    rx: oneshot::Receiver<RunResult>,
    event: Option<Event>,
}

impl Completion {
    /// A completion that is already resolved.
    pub fn ready(result: RunResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx, event: None }
    }

    /// A completion that already failed with `cause` while `event` was in flight.
    pub fn failed(event: Event, cause: FlowError) -> Self {
        Self::ready(Err(ProcessingException::new(event, cause)))
    }

    /// Blocks the calling thread until the run finishes.
    pub fn wait(self) -> RunResult {
        futures::executor::block_on(self)
    }
}

impl Future for Completion {
    type Output = RunResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => {
                let event = this
                    .event
                    .take()
                    .unwrap_or_else(|| Event::new(serde_json::Value::Null));
                Poll::Ready(Err(ProcessingException::new(
                    event,
                    FlowError::Disposed("the run was discarded before it completed".to_string()),
                )))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Sending half of a [`Completion`], moved along with the run.
///
/// Holds the run's concurrency permit, which is released before the result is
/// published.
#[derive(Debug)]
pub(crate) struct Completer {
    tx: Option<oneshot::Sender<RunResult>>,
    permit: Option<Permit>,
}

impl Completer {
    /// Attaches a permit acquired after the run was created.
    pub(crate) fn attach_permit(&mut self, permit: Permit) {
        self.permit = Some(permit);
    }

    /// Publishes the result.
    pub(crate) fn complete(mut self, result: RunResult) {
        drop(self.permit.take());
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(result);
        }
    }

    /// Publishes a failure raised while `event` was in flight.
    pub(crate) fn fail(self, event: Event, cause: FlowError) {
        self.complete(Err(ProcessingException::new(event, cause)));
    }
}

/// Creates a linked completer and completion for a run of `event`.
pub(crate) fn completion(event: &Event, permit: Option<Permit>) -> (Completer, Completion) {
    let (tx, rx) = oneshot::channel();
    (
        Completer {
            tx: Some(tx),
            permit,
        },
        Completion {
            rx,
            event: Some(event.clone()),
        },
    )
}
