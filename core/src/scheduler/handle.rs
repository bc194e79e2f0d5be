use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RunError;
use crate::types::{ExecutionBatchReport, ExecutionEvent};

/// Caller's end of a running batch: the event stream plus cancellation.
pub struct ExecutionHandle {
    events: mpsc::UnboundedReceiver<ExecutionEvent>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl ExecutionHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<ExecutionEvent>,
        cancel: CancellationToken,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            cancel,
            worker: Some(worker),
        }
    }

    /// A handle whose only event is `report`, for runs with nothing to do.
    pub fn completed(report: ExecutionBatchReport) -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail
        let _ = sender.send(ExecutionEvent::Report(report));

        Self {
            events,
            cancel: CancellationToken::new(),
            worker: None,
        }
    }

    /// Next event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<ExecutionEvent> {
        self.events.recv().await
    }

    /// Ask the worker to stop before its next statement.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the remaining events and return the final report.
    pub async fn report(mut self) -> Result<ExecutionBatchReport, RunError> {
        while let Some(event) = self.events.recv().await {
            if let ExecutionEvent::Report(report) = event {
                return Ok(report);
            }
        }

        let join_error = match self.worker.take() {
            Some(worker) => worker.await.err(),
            None => None,
        };
        Err(RunError::WorkerLost(join_error))
    }
}
